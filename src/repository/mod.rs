//! 本地存储层
//! 读取接口 + 以 ChangeSet 为单位的原子提交

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;

/// 对本地实体的一次变更
///
/// 删除和更新携带完整的旧记录，以便写入历史。
#[derive(Debug, Clone)]
pub enum Change {
    InsertBillingProject(BillingProject),
    UpdateBillingProject { before: BillingProject, after: BillingProject },
    DeleteBillingProject(BillingProject),

    InsertAccount(Account),
    UpdateAccount { before: Account, after: Account },
    DeleteAccount(Account),

    InsertManagedGroup(ManagedGroup),
    DeleteManagedGroup(ManagedGroup),

    InsertWorkspace(Workspace),
    DeleteWorkspace(Workspace),
    InsertAuthorizationDomain(WorkspaceAuthorizationDomain),
    DeleteAuthorizationDomain(WorkspaceAuthorizationDomain),
    InsertWorkspaceData(WorkspaceData),
    DeleteWorkspaceData(WorkspaceData),

    InsertGroupGroupMembership(GroupGroupMembership),
    DeleteGroupGroupMembership(GroupGroupMembership),
    InsertGroupAccountMembership(GroupAccountMembership),
    DeleteGroupAccountMembership(GroupAccountMembership),

    InsertWorkspaceGroupAccess(WorkspaceGroupAccess),
    UpdateWorkspaceGroupAccess { before: WorkspaceGroupAccess, after: WorkspaceGroupAccess },
    DeleteWorkspaceGroupAccess(WorkspaceGroupAccess),

    AppendHistory(HistoryRecord),
}

/// 一次变更对应的历史描述
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescriptor {
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub change_type: ChangeType,
    pub snapshot: serde_json::Value,
    pub previous: Option<serde_json::Value>,
}

fn snapshot<T: Serialize>(record: &T) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or_default()
}

fn created<T: Serialize>(kind: EntityKind, id: Uuid, record: &T) -> ChangeDescriptor {
    ChangeDescriptor {
        entity_type: kind,
        entity_id: id,
        change_type: ChangeType::Create,
        snapshot: snapshot(record),
        previous: None,
    }
}

fn updated<T: Serialize>(kind: EntityKind, id: Uuid, before: &T, after: &T) -> ChangeDescriptor {
    ChangeDescriptor {
        entity_type: kind,
        entity_id: id,
        change_type: ChangeType::Update,
        snapshot: snapshot(after),
        previous: Some(snapshot(before)),
    }
}

fn deleted<T: Serialize>(kind: EntityKind, id: Uuid, record: &T) -> ChangeDescriptor {
    let state = snapshot(record);
    ChangeDescriptor {
        entity_type: kind,
        entity_id: id,
        change_type: ChangeType::Delete,
        snapshot: state.clone(),
        previous: Some(state),
    }
}

impl Change {
    /// 历史记录本身不产生新的历史
    pub fn describe(&self) -> Option<ChangeDescriptor> {
        use EntityKind as K;

        let descriptor = match self {
            Change::InsertBillingProject(r) => created(K::BillingProject, r.id, r),
            Change::UpdateBillingProject { before, after } => {
                updated(K::BillingProject, after.id, before, after)
            }
            Change::DeleteBillingProject(r) => deleted(K::BillingProject, r.id, r),
            Change::InsertAccount(r) => created(K::Account, r.id, r),
            Change::UpdateAccount { before, after } => updated(K::Account, after.id, before, after),
            Change::DeleteAccount(r) => deleted(K::Account, r.id, r),
            Change::InsertManagedGroup(r) => created(K::ManagedGroup, r.id, r),
            Change::DeleteManagedGroup(r) => deleted(K::ManagedGroup, r.id, r),
            Change::InsertWorkspace(r) => created(K::Workspace, r.id, r),
            Change::DeleteWorkspace(r) => deleted(K::Workspace, r.id, r),
            Change::InsertAuthorizationDomain(r) => {
                created(K::WorkspaceAuthorizationDomain, r.id, r)
            }
            Change::DeleteAuthorizationDomain(r) => {
                deleted(K::WorkspaceAuthorizationDomain, r.id, r)
            }
            Change::InsertWorkspaceData(r) => created(K::WorkspaceData, r.id, r),
            Change::DeleteWorkspaceData(r) => deleted(K::WorkspaceData, r.id, r),
            Change::InsertGroupGroupMembership(r) => created(K::GroupGroupMembership, r.id, r),
            Change::DeleteGroupGroupMembership(r) => deleted(K::GroupGroupMembership, r.id, r),
            Change::InsertGroupAccountMembership(r) => created(K::GroupAccountMembership, r.id, r),
            Change::DeleteGroupAccountMembership(r) => deleted(K::GroupAccountMembership, r.id, r),
            Change::InsertWorkspaceGroupAccess(r) => created(K::WorkspaceGroupAccess, r.id, r),
            Change::UpdateWorkspaceGroupAccess { before, after } => {
                updated(K::WorkspaceGroupAccess, after.id, before, after)
            }
            Change::DeleteWorkspaceGroupAccess(r) => deleted(K::WorkspaceGroupAccess, r.id, r),
            Change::AppendHistory(_) => return None,
        };

        Some(descriptor)
    }
}

/// 需要在同一事务中提交的变更，按顺序应用
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn extend<I: IntoIterator<Item = Change>>(&mut self, changes: I) -> &mut Self {
        self.changes.extend(changes);
        self
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl From<Change> for ChangeSet {
    fn from(change: Change) -> Self {
        Self {
            changes: vec![change],
        }
    }
}

/// 本地实体存储
///
/// 名称和邮箱的查询不区分大小写。`commit` 要么全部应用，要么全部不应用。
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn billing_project_by_name(&self, name: &str) -> Result<Option<BillingProject>>;
    async fn billing_project_by_id(&self, id: Uuid) -> Result<Option<BillingProject>>;
    async fn list_billing_projects(&self) -> Result<Vec<BillingProject>>;

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>>;
    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>>;
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    async fn managed_group_by_name(&self, name: &str) -> Result<Option<ManagedGroup>>;
    async fn managed_group_by_id(&self, id: Uuid) -> Result<Option<ManagedGroup>>;
    async fn list_managed_groups(&self) -> Result<Vec<ManagedGroup>>;

    async fn workspace_by_name(
        &self,
        billing_project_id: Uuid,
        name: &str,
    ) -> Result<Option<Workspace>>;
    async fn workspace_by_id(&self, id: Uuid) -> Result<Option<Workspace>>;
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;
    async fn workspaces_in_billing_project(&self, billing_project_id: Uuid)
        -> Result<Vec<Workspace>>;

    async fn authorization_domains(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>>;
    /// 以该组为授权域的所有记录
    async fn authorization_domains_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>>;
    async fn workspace_data(&self, workspace_id: Uuid) -> Result<Option<WorkspaceData>>;

    /// 全部组嵌套关系
    async fn group_group_memberships(&self) -> Result<Vec<GroupGroupMembership>>;
    async fn group_account_memberships_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>>;
    async fn group_account_memberships_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>>;

    async fn workspace_group_accesses_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>>;
    async fn workspace_group_accesses_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>>;

    /// 最新的记录在前
    async fn history(
        &self,
        filters: &HistoryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRecord>>;

    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}
