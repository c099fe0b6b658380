//! Billing project models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validate_slug;

/// 远端计费项目的本地镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingProject {
    pub id: Uuid,
    pub name: String,
    /// 应用服务账户是否为该计费项目的用户
    pub has_app_as_user: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingProject {
    pub fn new(name: &str, has_app_as_user: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            has_app_as_user,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Import billing project request
#[derive(Debug, Deserialize, Validate)]
pub struct ImportBillingProjectRequest {
    #[validate(
        length(min = 1, max = 64, message = "Ensure this value has at most 64 characters."),
        custom(function = "validate_slug")
    )]
    pub name: String,
}
