//! 内存存储
//! 开发与测试使用；约束与 PostgreSQL 模式保持一致

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{Change, ChangeSet, Store};
use crate::error::{AppError, Result};
use crate::models::access::check_compute_allowed;
use crate::models::*;

#[derive(Debug, Clone, Default)]
struct Tables {
    billing_projects: BTreeMap<Uuid, BillingProject>,
    accounts: BTreeMap<Uuid, Account>,
    managed_groups: BTreeMap<Uuid, ManagedGroup>,
    workspaces: BTreeMap<Uuid, Workspace>,
    authorization_domains: BTreeMap<Uuid, WorkspaceAuthorizationDomain>,
    workspace_data: BTreeMap<Uuid, WorkspaceData>,
    group_groups: BTreeMap<Uuid, GroupGroupMembership>,
    group_accounts: BTreeMap<Uuid, GroupAccountMembership>,
    accesses: BTreeMap<Uuid, WorkspaceGroupAccess>,
    history: Vec<HistoryRecord>,
}

fn violation(msg: String) -> AppError {
    AppError::Constraint(msg)
}

fn require<T>(table: &BTreeMap<Uuid, T>, id: Uuid, what: &str) -> Result<()> {
    if table.contains_key(&id) {
        Ok(())
    } else {
        Err(violation(format!("{} {} does not exist", what, id)))
    }
}

fn remove<T>(table: &mut BTreeMap<Uuid, T>, id: Uuid, what: &str) -> Result<()> {
    table
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| violation(format!("{} {} does not exist", what, id)))
}

impl Tables {
    fn apply(&mut self, change: Change) -> Result<()> {
        match change {
            Change::InsertBillingProject(r) => {
                if self.billing_projects.values().any(|b| b.name.eq_ignore_ascii_case(&r.name)) {
                    return Err(violation(format!("billing project {} already exists", r.name)));
                }
                self.billing_projects.insert(r.id, r);
            }
            Change::UpdateBillingProject { after, .. } => {
                require(&self.billing_projects, after.id, "billing project")?;
                self.billing_projects.insert(after.id, after);
            }
            Change::DeleteBillingProject(r) => {
                if self.workspaces.values().any(|w| w.billing_project_id == r.id) {
                    return Err(violation(format!("billing project {} has workspaces", r.name)));
                }
                remove(&mut self.billing_projects, r.id, "billing project")?;
            }

            Change::InsertAccount(r) => {
                if self.accounts.values().any(|a| a.email.eq_ignore_ascii_case(&r.email)) {
                    return Err(violation(format!("account {} already exists", r.email)));
                }
                self.accounts.insert(r.id, r);
            }
            Change::UpdateAccount { after, .. } => {
                require(&self.accounts, after.id, "account")?;
                if self
                    .accounts
                    .values()
                    .any(|a| a.id != after.id && a.email.eq_ignore_ascii_case(&after.email))
                {
                    return Err(violation(format!("account {} already exists", after.email)));
                }
                self.accounts.insert(after.id, after);
            }
            Change::DeleteAccount(r) => {
                if self.group_accounts.values().any(|m| m.account_id == r.id) {
                    return Err(violation(format!("account {} has memberships", r.email)));
                }
                remove(&mut self.accounts, r.id, "account")?;
            }

            Change::InsertManagedGroup(r) => {
                if self.managed_groups.values().any(|g| g.name.eq_ignore_ascii_case(&r.name)) {
                    return Err(violation(format!("managed group {} already exists", r.name)));
                }
                self.managed_groups.insert(r.id, r);
            }
            Change::DeleteManagedGroup(r) => {
                let referenced = self
                    .group_groups
                    .values()
                    .any(|m| m.parent_group_id == r.id || m.child_group_id == r.id)
                    || self.group_accounts.values().any(|m| m.group_id == r.id)
                    || self.authorization_domains.values().any(|d| d.group_id == r.id)
                    || self.accesses.values().any(|a| a.group_id == r.id);
                if referenced {
                    return Err(violation(format!("managed group {} is still referenced", r.name)));
                }
                remove(&mut self.managed_groups, r.id, "managed group")?;
            }

            Change::InsertWorkspace(r) => {
                require(&self.billing_projects, r.billing_project_id, "billing project")?;
                if self.workspaces.values().any(|w| {
                    w.billing_project_id == r.billing_project_id
                        && w.name.eq_ignore_ascii_case(&r.name)
                }) {
                    return Err(violation(format!("workspace {} already exists", r.name)));
                }
                self.workspaces.insert(r.id, r);
            }
            Change::DeleteWorkspace(r) => {
                let referenced = self.authorization_domains.values().any(|d| d.workspace_id == r.id)
                    || self.workspace_data.values().any(|d| d.workspace_id == r.id)
                    || self.accesses.values().any(|a| a.workspace_id == r.id);
                if referenced {
                    return Err(violation(format!("workspace {} is still referenced", r.name)));
                }
                remove(&mut self.workspaces, r.id, "workspace")?;
            }
            Change::InsertAuthorizationDomain(r) => {
                require(&self.workspaces, r.workspace_id, "workspace")?;
                require(&self.managed_groups, r.group_id, "managed group")?;
                if self
                    .authorization_domains
                    .values()
                    .any(|d| d.workspace_id == r.workspace_id && d.group_id == r.group_id)
                {
                    return Err(violation("duplicate authorization domain".to_string()));
                }
                self.authorization_domains.insert(r.id, r);
            }
            Change::DeleteAuthorizationDomain(r) => {
                remove(&mut self.authorization_domains, r.id, "authorization domain")?;
            }
            Change::InsertWorkspaceData(r) => {
                require(&self.workspaces, r.workspace_id, "workspace")?;
                if self.workspace_data.values().any(|d| d.workspace_id == r.workspace_id) {
                    return Err(violation("workspace data already exists".to_string()));
                }
                self.workspace_data.insert(r.id, r);
            }
            Change::DeleteWorkspaceData(r) => {
                remove(&mut self.workspace_data, r.id, "workspace data")?;
            }

            Change::InsertGroupGroupMembership(r) => {
                require(&self.managed_groups, r.parent_group_id, "managed group")?;
                require(&self.managed_groups, r.child_group_id, "managed group")?;
                if r.parent_group_id == r.child_group_id {
                    return Err(violation("a group cannot be a member of itself".to_string()));
                }
                if self.group_groups.values().any(|m| {
                    m.parent_group_id == r.parent_group_id
                        && m.child_group_id == r.child_group_id
                        && m.role == r.role
                }) {
                    return Err(violation("duplicate group membership".to_string()));
                }
                self.group_groups.insert(r.id, r);
            }
            Change::DeleteGroupGroupMembership(r) => {
                remove(&mut self.group_groups, r.id, "group membership")?;
            }
            Change::InsertGroupAccountMembership(r) => {
                require(&self.managed_groups, r.group_id, "managed group")?;
                require(&self.accounts, r.account_id, "account")?;
                if self.group_accounts.values().any(|m| {
                    m.group_id == r.group_id && m.account_id == r.account_id && m.role == r.role
                }) {
                    return Err(violation("duplicate account membership".to_string()));
                }
                self.group_accounts.insert(r.id, r);
            }
            Change::DeleteGroupAccountMembership(r) => {
                remove(&mut self.group_accounts, r.id, "account membership")?;
            }

            Change::InsertWorkspaceGroupAccess(r) => {
                require(&self.workspaces, r.workspace_id, "workspace")?;
                require(&self.managed_groups, r.group_id, "managed group")?;
                if !check_compute_allowed(r.access, r.can_compute) {
                    return Err(violation("readers cannot have compute access".to_string()));
                }
                if self
                    .accesses
                    .values()
                    .any(|a| a.workspace_id == r.workspace_id && a.group_id == r.group_id)
                {
                    return Err(violation("duplicate workspace access".to_string()));
                }
                self.accesses.insert(r.id, r);
            }
            Change::UpdateWorkspaceGroupAccess { after, .. } => {
                require(&self.accesses, after.id, "workspace access")?;
                if !check_compute_allowed(after.access, after.can_compute) {
                    return Err(violation("readers cannot have compute access".to_string()));
                }
                self.accesses.insert(after.id, after);
            }
            Change::DeleteWorkspaceGroupAccess(r) => {
                remove(&mut self.accesses, r.id, "workspace access")?;
            }

            Change::AppendHistory(record) => self.history.push(record),
        }
        Ok(())
    }
}

/// 基于快照替换的内存存储：提交时复制全部表，全部应用成功后再替换
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        Ok(f(&self.tables.read()))
    }
}

fn sorted_by<T: Clone, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn billing_project_by_name(&self, name: &str) -> Result<Option<BillingProject>> {
        self.read(|t| {
            t.billing_projects
                .values()
                .find(|b| b.name.eq_ignore_ascii_case(name))
                .cloned()
        })
    }

    async fn billing_project_by_id(&self, id: Uuid) -> Result<Option<BillingProject>> {
        self.read(|t| t.billing_projects.get(&id).cloned())
    }

    async fn list_billing_projects(&self) -> Result<Vec<BillingProject>> {
        self.read(|t| sorted_by(t.billing_projects.values().cloned(), |b| b.name.to_lowercase()))
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.read(|t| {
            t.accounts
                .values()
                .find(|a| a.email.eq_ignore_ascii_case(email))
                .cloned()
        })
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        self.read(|t| t.accounts.get(&id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.read(|t| sorted_by(t.accounts.values().cloned(), |a| a.email.clone()))
    }

    async fn managed_group_by_name(&self, name: &str) -> Result<Option<ManagedGroup>> {
        self.read(|t| {
            t.managed_groups
                .values()
                .find(|g| g.name.eq_ignore_ascii_case(name))
                .cloned()
        })
    }

    async fn managed_group_by_id(&self, id: Uuid) -> Result<Option<ManagedGroup>> {
        self.read(|t| t.managed_groups.get(&id).cloned())
    }

    async fn list_managed_groups(&self) -> Result<Vec<ManagedGroup>> {
        self.read(|t| sorted_by(t.managed_groups.values().cloned(), |g| g.name.to_lowercase()))
    }

    async fn workspace_by_name(
        &self,
        billing_project_id: Uuid,
        name: &str,
    ) -> Result<Option<Workspace>> {
        self.read(|t| {
            t.workspaces
                .values()
                .find(|w| {
                    w.billing_project_id == billing_project_id && w.name.eq_ignore_ascii_case(name)
                })
                .cloned()
        })
    }

    async fn workspace_by_id(&self, id: Uuid) -> Result<Option<Workspace>> {
        self.read(|t| t.workspaces.get(&id).cloned())
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.read(|t| sorted_by(t.workspaces.values().cloned(), |w| w.name.to_lowercase()))
    }

    async fn workspaces_in_billing_project(
        &self,
        billing_project_id: Uuid,
    ) -> Result<Vec<Workspace>> {
        self.read(|t| {
            sorted_by(
                t.workspaces
                    .values()
                    .filter(|w| w.billing_project_id == billing_project_id)
                    .cloned(),
                |w| w.name.to_lowercase(),
            )
        })
    }

    async fn authorization_domains(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>> {
        self.read(|t| {
            sorted_by(
                t.authorization_domains
                    .values()
                    .filter(|d| d.workspace_id == workspace_id)
                    .cloned(),
                |d| d.created_at,
            )
        })
    }

    async fn authorization_domains_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>> {
        self.read(|t| {
            t.authorization_domains
                .values()
                .filter(|d| d.group_id == group_id)
                .cloned()
                .collect()
        })
    }

    async fn workspace_data(&self, workspace_id: Uuid) -> Result<Option<WorkspaceData>> {
        self.read(|t| {
            t.workspace_data
                .values()
                .find(|d| d.workspace_id == workspace_id)
                .cloned()
        })
    }

    async fn group_group_memberships(&self) -> Result<Vec<GroupGroupMembership>> {
        self.read(|t| sorted_by(t.group_groups.values().cloned(), |m| m.created_at))
    }

    async fn group_account_memberships_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>> {
        self.read(|t| {
            sorted_by(
                t.group_accounts
                    .values()
                    .filter(|m| m.group_id == group_id)
                    .cloned(),
                |m| m.created_at,
            )
        })
    }

    async fn group_account_memberships_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>> {
        self.read(|t| {
            sorted_by(
                t.group_accounts
                    .values()
                    .filter(|m| m.account_id == account_id)
                    .cloned(),
                |m| m.created_at,
            )
        })
    }

    async fn workspace_group_accesses_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>> {
        self.read(|t| {
            t.accesses
                .values()
                .filter(|a| a.workspace_id == workspace_id)
                .cloned()
                .collect()
        })
    }

    async fn workspace_group_accesses_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>> {
        self.read(|t| {
            t.accesses
                .values()
                .filter(|a| a.group_id == group_id)
                .cloned()
                .collect()
        })
    }

    async fn history(
        &self,
        filters: &HistoryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRecord>> {
        self.read(|t| {
            t.history
                .iter()
                .rev()
                .filter(|r| filters.matches(r))
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect()
        })
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write();
        let mut next = tables.clone();
        for change in changes {
            next.apply(change)?;
        }
        *tables = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let group = ManagedGroup::new("group-a", true);
        store
            .commit(Change::InsertManagedGroup(group.clone()).into())
            .await
            .unwrap();

        let mut changes = ChangeSet::new();
        changes
            .push(Change::InsertManagedGroup(ManagedGroup::new("group-b", true)))
            .push(Change::InsertManagedGroup(ManagedGroup::new("GROUP-A", true)));

        let result = store.commit(changes).await;
        assert!(matches!(result, Err(AppError::Constraint(_))));
        assert!(store.managed_group_by_name("group-b").await.unwrap().is_none());
        assert_eq!(store.list_managed_groups().await.unwrap(), vec![group]);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let bp = BillingProject::new("My-Project", true);
        store
            .commit(Change::InsertBillingProject(bp.clone()).into())
            .await
            .unwrap();

        assert_eq!(store.billing_project_by_name("my-project").await.unwrap(), Some(bp));
    }

    #[tokio::test]
    async fn test_group_delete_is_restricted_while_referenced() {
        let store = MemoryStore::new();
        let parent = ManagedGroup::new("parent", true);
        let child = ManagedGroup::new("child", true);
        let edge = GroupGroupMembership::new(parent.id, child.id, MembershipRole::Member);

        let mut changes = ChangeSet::new();
        changes
            .push(Change::InsertManagedGroup(parent.clone()))
            .push(Change::InsertManagedGroup(child.clone()))
            .push(Change::InsertGroupGroupMembership(edge));
        store.commit(changes).await.unwrap();

        let result = store.commit(Change::DeleteManagedGroup(child).into()).await;
        assert!(matches!(result, Err(AppError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_reader_with_compute_is_rejected() {
        let store = MemoryStore::new();
        let bp = BillingProject::new("bp", true);
        let ws = Workspace::new(bp.id, "ws", "workspace");
        let group = ManagedGroup::new("g", true);

        let mut changes = ChangeSet::new();
        changes
            .push(Change::InsertBillingProject(bp))
            .push(Change::InsertWorkspace(ws.clone()))
            .push(Change::InsertManagedGroup(group.clone()))
            .push(Change::InsertWorkspaceGroupAccess(WorkspaceGroupAccess::new(
                ws.id,
                group.id,
                WorkspaceAccessLevel::Reader,
                true,
            )));

        assert!(store.commit(changes).await.is_err());
        assert!(store.list_workspaces().await.unwrap().is_empty());
    }
}
