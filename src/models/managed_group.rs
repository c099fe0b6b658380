//! Managed group models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validate_slug;

/// 远端托管组的本地镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ManagedGroup {
    pub id: Uuid,
    pub name: String,
    /// 应用服务账户是否为该组的管理员
    pub is_managed_by_app: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManagedGroup {
    pub fn new(name: &str, is_managed_by_app: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_managed_by_app,
            created_at: now,
            updated_at: now,
        }
    }

    /// 远端平台上该组的邮箱地址
    pub fn email(&self, domain: &str) -> String {
        format!("{}@{}", self.name, domain)
    }
}

/// Create or import managed group request
#[derive(Debug, Deserialize, Validate)]
pub struct ManagedGroupRequest {
    #[validate(
        length(min = 1, max = 64, message = "Ensure this value has at most 64 characters."),
        custom(function = "validate_slug")
    )]
    pub name: String,
}
