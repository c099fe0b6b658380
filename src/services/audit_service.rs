//! 变更历史服务
//! 每次本地提交前，为其中的每条实体变更追加一条历史记录

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{HistoryFilters, HistoryRecord};
use crate::repository::{Change, ChangeSet, Store};

/// 产生本地变更的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    BillingProjectImport,
    BillingProjectUpdate,
    BillingProjectDelete,

    AccountImport,
    AccountDeactivate,
    AccountReactivate,
    AccountDelete,

    ManagedGroupCreate,
    ManagedGroupImport,
    ManagedGroupDelete,

    GroupGroupMembershipCreate,
    GroupGroupMembershipDelete,
    GroupAccountMembershipCreate,
    GroupAccountMembershipDelete,

    WorkspaceCreate,
    WorkspaceImport,
    WorkspaceClone,
    WorkspaceDelete,

    WorkspaceAccessCreate,
    WorkspaceAccessUpdate,
    WorkspaceAccessDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BillingProjectImport => "billing_project.import",
            AuditAction::BillingProjectUpdate => "billing_project.update",
            AuditAction::BillingProjectDelete => "billing_project.delete",

            AuditAction::AccountImport => "account.import",
            AuditAction::AccountDeactivate => "account.deactivate",
            AuditAction::AccountReactivate => "account.reactivate",
            AuditAction::AccountDelete => "account.delete",

            AuditAction::ManagedGroupCreate => "managed_group.create",
            AuditAction::ManagedGroupImport => "managed_group.import",
            AuditAction::ManagedGroupDelete => "managed_group.delete",

            AuditAction::GroupGroupMembershipCreate => "group_group_membership.create",
            AuditAction::GroupGroupMembershipDelete => "group_group_membership.delete",
            AuditAction::GroupAccountMembershipCreate => "group_account_membership.create",
            AuditAction::GroupAccountMembershipDelete => "group_account_membership.delete",

            AuditAction::WorkspaceCreate => "workspace.create",
            AuditAction::WorkspaceImport => "workspace.import",
            AuditAction::WorkspaceClone => "workspace.clone",
            AuditAction::WorkspaceDelete => "workspace.delete",

            AuditAction::WorkspaceAccessCreate => "workspace_access.create",
            AuditAction::WorkspaceAccessUpdate => "workspace_access.update",
            AuditAction::WorkspaceAccessDelete => "workspace_access.delete",
        }
    }
}

pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 为变更集生成历史记录，追加在变更集末尾
    pub fn seal(&self, changes: &mut ChangeSet, action: AuditAction) {
        let recorded_at = Utc::now();
        let records: Vec<Change> = changes
            .iter()
            .filter_map(Change::describe)
            .map(|d| {
                Change::AppendHistory(HistoryRecord {
                    id: Uuid::new_v4(),
                    entity_type: d.entity_type,
                    entity_id: d.entity_id,
                    change_type: d.change_type,
                    snapshot: d.snapshot,
                    previous: d.previous,
                    summary: Some(action.as_str().to_string()),
                    recorded_at,
                })
            })
            .collect();
        changes.extend(records);
    }

    /// 追加历史记录并原子提交
    pub async fn commit(&self, mut changes: ChangeSet, action: AuditAction) -> Result<()> {
        self.seal(&mut changes, action);
        debug!(action = action.as_str(), changes = changes.len(), "Committing local changes");
        self.store.commit(changes).await?;
        metrics::counter!("local_commits_total", "action" => action.as_str()).increment(1);
        Ok(())
    }

    /// 查询历史记录
    pub async fn query_history(
        &self,
        filters: &HistoryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.store.history(filters, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeType, EntityKind, ManagedGroup};
    use crate::repository::MemoryStore;

    #[tokio::test]
    async fn test_commit_appends_history() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditService::new(store.clone());
        let group = ManagedGroup::new("g", true);

        audit
            .commit(
                Change::InsertManagedGroup(group.clone()).into(),
                AuditAction::ManagedGroupCreate,
            )
            .await
            .unwrap();

        let history = audit
            .query_history(&HistoryFilters::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entity_type, EntityKind::ManagedGroup);
        assert_eq!(history[0].entity_id, group.id);
        assert_eq!(history[0].change_type, ChangeType::Create);
        assert_eq!(history[0].summary.as_deref(), Some("managed_group.create"));
    }

    #[test]
    fn test_seal_appends_after_entity_changes() {
        let audit = AuditService::new(Arc::new(MemoryStore::new()));
        let mut changes = ChangeSet::new();
        changes
            .push(Change::InsertManagedGroup(ManagedGroup::new("a", true)))
            .push(Change::InsertManagedGroup(ManagedGroup::new("b", true)));

        audit.seal(&mut changes, AuditAction::ManagedGroupImport);

        let kinds: Vec<bool> = changes
            .iter()
            .map(|c| matches!(c, Change::AppendHistory(_)))
            .collect();
        assert_eq!(kinds, vec![false, false, true, true]);
    }
}
