//! Workspace sharing models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    /// 托管组对工作区的访问级别
    WorkspaceAccessLevel {
        Owner => "OWNER",
        Writer => "WRITER",
        Reader => "READER",
    }
}

/// 远端撤销访问时使用的级别
pub const NO_ACCESS: &str = "NO ACCESS";

/// 工作区共享给托管组的记录，(workspace, group) 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceGroupAccess {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub group_id: Uuid,
    #[sqlx(try_from = "String")]
    pub access: WorkspaceAccessLevel,
    pub can_compute: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceGroupAccess {
    pub fn new(
        workspace_id: Uuid,
        group_id: Uuid,
        access: WorkspaceAccessLevel,
        can_compute: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            group_id,
            access,
            can_compute,
            created_at: now,
            updated_at: now,
        }
    }
}

/// READER 不能拥有计算权限
pub fn check_compute_allowed(access: WorkspaceAccessLevel, can_compute: bool) -> bool {
    !(access == WorkspaceAccessLevel::Reader && can_compute)
}

/// Share workspace request
#[derive(Debug, Deserialize, Validate)]
pub struct GrantAccessRequest {
    #[validate(length(min = 1, message = "This field is required."))]
    pub group: String,
    pub access: WorkspaceAccessLevel,
    #[serde(default)]
    pub can_compute: bool,
}

/// Update sharing request
#[derive(Debug, Deserialize)]
pub struct UpdateAccessRequest {
    pub access: WorkspaceAccessLevel,
    #[serde(default)]
    pub can_compute: bool,
}
