//! Change history models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// 变更类型
    ChangeType {
        Create => "create",
        Update => "update",
        Delete => "delete",
    }
}

text_enum! {
    /// 历史记录所属的实体类型
    EntityKind {
        BillingProject => "billing_project",
        Account => "account",
        ManagedGroup => "managed_group",
        Workspace => "workspace",
        WorkspaceAuthorizationDomain => "workspace_authorization_domain",
        WorkspaceData => "workspace_data",
        GroupGroupMembership => "group_group_membership",
        GroupAccountMembership => "group_account_membership",
        WorkspaceGroupAccess => "workspace_group_access",
    }
}

/// 本地实体的一次变更记录，与变更在同一事务中写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryRecord {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    #[sqlx(try_from = "String")]
    pub change_type: ChangeType,
    /// 变更后的字段值（删除时为删除前的值）
    pub snapshot: serde_json::Value,
    /// 变更前的字段值（创建时为空）
    pub previous: Option<serde_json::Value>,
    pub summary: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// History query filters
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFilters {
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub change_type: Option<ChangeType>,
}

impl HistoryFilters {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        self.entity_type.map_or(true, |t| t == record.entity_type)
            && self.entity_id.map_or(true, |id| id == record.entity_id)
            && self.change_type.map_or(true, |c| c == record.change_type)
    }
}
