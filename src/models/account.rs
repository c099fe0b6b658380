//! Account models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    /// 账户在本应用中的状态
    AccountStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
    }
}

/// 远端用户或服务账户的本地镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    /// 保存前统一转为小写
    pub email: String,
    pub is_service_account: bool,
    #[sqlx(try_from = "String")]
    pub status: AccountStatus,
    pub deactivate_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: &str, is_service_account: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            is_service_account,
            status: AccountStatus::Active,
            deactivate_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Import account request
#[derive(Debug, Deserialize, Validate)]
pub struct ImportAccountRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    pub is_service_account: bool,
}
