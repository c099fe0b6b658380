//! 测试公共模块
//! 脚本化的远端平台替身、内存存储和种子数据

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::Secret;
use std::collections::HashSet;
use std::sync::Arc;

use anvil_console::{
    adapters::{AdapterRegistry, ConfiguredAdapter, DataField, FieldKind},
    config::{
        AppConfig, DatabaseConfig, LoggingConfig, RemoteConfig, ServerConfig, StoreBackend,
    },
    middleware::AppState,
    models::*,
    remote::{
        AccountLookup, AclEntry, AclPatchResponse, AnvilApi, RemoteError, RemoteGroup,
        RemoteResult, RemoteWorkspace,
    },
    repository::{Change, ChangeSet, MemoryStore, Store},
};

pub const GROUP_DOMAIN: &str = "firecloud.org";

/// 对远端平台的一次调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status,
    Me,
    CreateGroup(String),
    DeleteGroup(String),
    GroupExists(String),
    ListMyGroups,
    AddMember {
        group: String,
        role: MembershipRole,
        email: String,
    },
    RemoveMember {
        group: String,
        role: MembershipRole,
        email: String,
    },
    CheckBillingProject(String),
    CheckAccount(String),
    CreateWorkspace {
        namespace: String,
        name: String,
        auth_domains: Vec<String>,
    },
    CloneWorkspace {
        from: String,
        namespace: String,
        name: String,
        auth_domains: Vec<String>,
    },
    DeleteWorkspace {
        namespace: String,
        name: String,
    },
    ListWorkspaces,
    GetWorkspace {
        namespace: String,
        name: String,
    },
    PatchAcl {
        namespace: String,
        name: String,
        entries: Vec<AclEntry>,
    },
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Call::Status => "status",
            Call::Me => "me",
            Call::CreateGroup(_) => "create_group",
            Call::DeleteGroup(_) => "delete_group",
            Call::GroupExists(_) => "group_exists",
            Call::ListMyGroups => "list_my_groups",
            Call::AddMember { .. } => "add_member",
            Call::RemoveMember { .. } => "remove_member",
            Call::CheckBillingProject(_) => "check_billing_project",
            Call::CheckAccount(_) => "check_account",
            Call::CreateWorkspace { .. } => "create_workspace",
            Call::CloneWorkspace { .. } => "clone_workspace",
            Call::DeleteWorkspace { .. } => "delete_workspace",
            Call::ListWorkspaces => "list_workspaces",
            Call::GetWorkspace { .. } => "get_workspace",
            Call::PatchAcl { .. } => "patch_acl",
        }
    }

    /// 组名或 "namespace/name"，用于按对象注入失败
    fn target(&self) -> Option<String> {
        match self {
            Call::CreateGroup(g) | Call::DeleteGroup(g) | Call::GroupExists(g) => Some(g.clone()),
            Call::AddMember { group, .. } | Call::RemoveMember { group, .. } => Some(group.clone()),
            Call::CheckBillingProject(n) | Call::CheckAccount(n) => Some(n.clone()),
            Call::CreateWorkspace { namespace, name, .. }
            | Call::CloneWorkspace { namespace, name, .. }
            | Call::DeleteWorkspace { namespace, name }
            | Call::GetWorkspace { namespace, name }
            | Call::PatchAcl { namespace, name, .. } => Some(format!("{}/{}", namespace, name)),
            _ => None,
        }
    }
}

/// ACL PATCH 的脚本化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOutcome {
    Updated,
    NotFound,
    Ignored,
}

struct Failure {
    op: &'static str,
    target: Option<String>,
    error: RemoteError,
}

#[derive(Default)]
struct Script {
    failures: Vec<Failure>,
    group_survives_delete: bool,
    not_user_of: HashSet<String>,
    missing_accounts: HashSet<String>,
    my_groups: Vec<RemoteGroup>,
    workspaces: Vec<RemoteWorkspace>,
    acl_outcome: Option<AclOutcome>,
}

/// 记录每次调用的远端平台替身
#[derive(Default)]
pub struct FakeAnvil {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
}

impl FakeAnvil {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// 让某类调用失败；target 为 None 时对所有对象生效
    pub fn fail(&self, op: &'static str, target: Option<&str>, status: u16, message: &str) {
        self.script.lock().failures.push(Failure {
            op,
            target: target.map(str::to_string),
            error: RemoteError::new(status, message),
        });
    }

    pub fn group_survives_delete(&self) {
        self.script.lock().group_survives_delete = true;
    }

    pub fn not_user_of(&self, billing_project: &str) {
        self.script.lock().not_user_of.insert(billing_project.to_string());
    }

    pub fn missing_account(&self, email: &str) {
        self.script.lock().missing_accounts.insert(email.to_lowercase());
    }

    pub fn member_of(&self, group: &str, role: &str) {
        self.script.lock().my_groups.push(RemoteGroup {
            group_name: group.to_string(),
            group_email: format!("{}@{}", group, GROUP_DOMAIN),
            role: role.to_string(),
        });
    }

    pub fn remote_workspace(&self, namespace: &str, name: &str, access_level: &str, auth_domains: &[&str]) {
        self.script.lock().workspaces.push(RemoteWorkspace {
            namespace: namespace.to_string(),
            name: name.to_string(),
            access_level: access_level.to_string(),
            authorization_domains: auth_domains.iter().map(|d| d.to_string()).collect(),
        });
    }

    pub fn acl_outcome(&self, outcome: AclOutcome) {
        self.script.lock().acl_outcome = Some(outcome);
    }

    fn record(&self, call: Call) -> RemoteResult<()> {
        let op = call.op();
        let target = call.target();
        self.calls.lock().push(call);

        let script = self.script.lock();
        match script.failures.iter().find(|f| {
            f.op == op && (f.target.is_none() || f.target.as_deref() == target.as_deref())
        }) {
            Some(f) => Err(f.error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AnvilApi for FakeAnvil {
    fn group_email_domain(&self) -> &str {
        GROUP_DOMAIN
    }

    async fn status(&self) -> RemoteResult<serde_json::Value> {
        self.record(Call::Status)?;
        Ok(serde_json::json!({ "ok": true }))
    }

    async fn me(&self) -> RemoteResult<serde_json::Value> {
        self.record(Call::Me)?;
        Ok(serde_json::json!({ "userEmail": "app@example.com" }))
    }

    async fn create_group(&self, group_name: &str) -> RemoteResult<()> {
        self.record(Call::CreateGroup(group_name.to_string()))
    }

    async fn delete_group(&self, group_name: &str) -> RemoteResult<()> {
        self.record(Call::DeleteGroup(group_name.to_string()))
    }

    async fn group_exists(&self, group_name: &str) -> RemoteResult<bool> {
        self.record(Call::GroupExists(group_name.to_string()))?;
        let script = self.script.lock();
        Ok(script.group_survives_delete
            || script
                .my_groups
                .iter()
                .any(|g| g.group_name.eq_ignore_ascii_case(group_name)))
    }

    async fn list_my_groups(&self) -> RemoteResult<Vec<RemoteGroup>> {
        self.record(Call::ListMyGroups)?;
        Ok(self.script.lock().my_groups.clone())
    }

    async fn add_member(&self, group: &str, role: MembershipRole, email: &str) -> RemoteResult<()> {
        self.record(Call::AddMember {
            group: group.to_string(),
            role,
            email: email.to_string(),
        })
    }

    async fn remove_member(
        &self,
        group: &str,
        role: MembershipRole,
        email: &str,
    ) -> RemoteResult<()> {
        self.record(Call::RemoveMember {
            group: group.to_string(),
            role,
            email: email.to_string(),
        })
    }

    async fn check_billing_project(&self, name: &str) -> RemoteResult<bool> {
        self.record(Call::CheckBillingProject(name.to_string()))?;
        Ok(!self.script.lock().not_user_of.contains(name))
    }

    async fn check_account(&self, email: &str) -> RemoteResult<AccountLookup> {
        self.record(Call::CheckAccount(email.to_string()))?;
        if self.script.lock().missing_accounts.contains(&email.to_lowercase()) {
            Ok(AccountLookup::NotFound)
        } else {
            Ok(AccountLookup::Found)
        }
    }

    async fn create_workspace(
        &self,
        namespace: &str,
        name: &str,
        auth_domains: &[String],
    ) -> RemoteResult<()> {
        self.record(Call::CreateWorkspace {
            namespace: namespace.to_string(),
            name: name.to_string(),
            auth_domains: auth_domains.to_vec(),
        })
    }

    async fn clone_workspace(
        &self,
        source_namespace: &str,
        source_name: &str,
        namespace: &str,
        name: &str,
        auth_domains: &[String],
    ) -> RemoteResult<()> {
        self.record(Call::CloneWorkspace {
            from: format!("{}/{}", source_namespace, source_name),
            namespace: namespace.to_string(),
            name: name.to_string(),
            auth_domains: auth_domains.to_vec(),
        })
    }

    async fn delete_workspace(&self, namespace: &str, name: &str) -> RemoteResult<()> {
        self.record(Call::DeleteWorkspace {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn list_workspaces(&self) -> RemoteResult<Vec<RemoteWorkspace>> {
        self.record(Call::ListWorkspaces)?;
        Ok(self.script.lock().workspaces.clone())
    }

    async fn get_workspace(&self, namespace: &str, name: &str) -> RemoteResult<RemoteWorkspace> {
        self.record(Call::GetWorkspace {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;
        self.script
            .lock()
            .workspaces
            .iter()
            .find(|w| w.namespace == namespace && w.name == name)
            .cloned()
            .ok_or_else(|| RemoteError::new(404, "Workspace not found"))
    }

    async fn patch_acl(
        &self,
        namespace: &str,
        name: &str,
        entries: &[AclEntry],
    ) -> RemoteResult<AclPatchResponse> {
        self.record(Call::PatchAcl {
            namespace: namespace.to_string(),
            name: name.to_string(),
            entries: entries.to_vec(),
        })?;
        let outcome = self.script.lock().acl_outcome.unwrap_or(AclOutcome::Updated);
        Ok(match outcome {
            AclOutcome::Updated => AclPatchResponse {
                users_updated: entries.to_vec(),
                ..Default::default()
            },
            AclOutcome::NotFound => AclPatchResponse {
                users_not_found: entries.to_vec(),
                ..Default::default()
            },
            AclOutcome::Ignored => AclPatchResponse::default(),
        })
    }
}

pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            url: Secret::new(String::new()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        remote: RemoteConfig {
            entry_point: "http://127.0.0.1:1".to_string(),
            access_token: Secret::new("test-token".to_string()),
            group_email_domain: GROUP_DOMAIN.to_string(),
            timeout_secs: 5,
        },
        adapters: vec![],
    }
}

/// 带一个 "study" 类型的注册表，study 要求 study_name 字段
pub fn test_registry() -> Arc<AdapterRegistry> {
    let registry = AdapterRegistry::with_default();
    registry
        .register(Arc::new(ConfiguredAdapter::new(
            "study",
            "Study workspace",
            vec![
                DataField {
                    name: "study_name".to_string(),
                    kind: FieldKind::Text,
                    required: true,
                },
                DataField {
                    name: "participants".to_string(),
                    kind: FieldKind::Integer,
                    required: false,
                },
            ],
        )))
        .expect("study adapter registers");
    Arc::new(registry)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub api: Arc<FakeAnvil>,
    pub state: Arc<AppState>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let api = FakeAnvil::new();
    let state = Arc::new(AppState::new(
        create_test_config(),
        store.clone(),
        api.clone(),
        test_registry(),
    ));
    Harness { store, api, state }
}

/// 各表行数，用于比对操作前后
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub billing_projects: usize,
    pub accounts: usize,
    pub managed_groups: usize,
    pub workspaces: usize,
    pub group_memberships: usize,
    pub account_memberships: usize,
    pub accesses: usize,
    pub history: usize,
}

pub async fn row_counts(store: &dyn Store) -> RowCounts {
    let accounts = store.list_accounts().await.unwrap();
    let workspaces = store.list_workspaces().await.unwrap();

    let mut account_memberships = 0;
    for account in &accounts {
        account_memberships += store
            .group_account_memberships_for_account(account.id)
            .await
            .unwrap()
            .len();
    }
    let mut accesses = 0;
    for workspace in &workspaces {
        accesses += store
            .workspace_group_accesses_for_workspace(workspace.id)
            .await
            .unwrap()
            .len();
    }

    RowCounts {
        billing_projects: store.list_billing_projects().await.unwrap().len(),
        accounts: accounts.len(),
        managed_groups: store.list_managed_groups().await.unwrap().len(),
        workspaces: workspaces.len(),
        group_memberships: store.group_group_memberships().await.unwrap().len(),
        account_memberships,
        accesses,
        history: store
            .history(&HistoryFilters::default(), 10_000, 0)
            .await
            .unwrap()
            .len(),
    }
}

async fn seed(store: &dyn Store, change: Change) {
    store.commit(ChangeSet::from(change)).await.unwrap();
}

pub async fn seed_billing_project(store: &dyn Store, name: &str) -> BillingProject {
    let bp = BillingProject::new(name, true);
    seed(store, Change::InsertBillingProject(bp.clone())).await;
    bp
}

pub async fn seed_group(store: &dyn Store, name: &str, managed: bool) -> ManagedGroup {
    let group = ManagedGroup::new(name, managed);
    seed(store, Change::InsertManagedGroup(group.clone())).await;
    group
}

pub async fn seed_account(store: &dyn Store, email: &str) -> Account {
    let account = Account::new(email, false);
    seed(store, Change::InsertAccount(account.clone())).await;
    account
}

pub async fn seed_group_membership(
    store: &dyn Store,
    parent: &ManagedGroup,
    child: &ManagedGroup,
) -> GroupGroupMembership {
    let membership = GroupGroupMembership::new(parent.id, child.id, MembershipRole::Member);
    seed(store, Change::InsertGroupGroupMembership(membership.clone())).await;
    membership
}

pub async fn seed_account_membership(
    store: &dyn Store,
    group: &ManagedGroup,
    account: &Account,
) -> GroupAccountMembership {
    let membership = GroupAccountMembership::new(group.id, account.id, MembershipRole::Member);
    seed(store, Change::InsertGroupAccountMembership(membership.clone())).await;
    membership
}

pub async fn seed_workspace(
    store: &dyn Store,
    billing_project: &BillingProject,
    name: &str,
    auth_domains: &[&ManagedGroup],
) -> Workspace {
    let workspace = Workspace::new(billing_project.id, name, "workspace");
    let mut changes = ChangeSet::new();
    changes.push(Change::InsertWorkspace(workspace.clone()));
    for group in auth_domains {
        changes.push(Change::InsertAuthorizationDomain(
            WorkspaceAuthorizationDomain::new(workspace.id, group.id),
        ));
    }
    changes.push(Change::InsertWorkspaceData(WorkspaceData::new(
        workspace.id,
        "workspace",
        serde_json::json!({}),
    )));
    store.commit(changes).await.unwrap();
    workspace
}

pub async fn seed_access(
    store: &dyn Store,
    workspace: &Workspace,
    group: &ManagedGroup,
    access: WorkspaceAccessLevel,
    can_compute: bool,
) -> WorkspaceGroupAccess {
    let row = WorkspaceGroupAccess::new(workspace.id, group.id, access, can_compute);
    seed(store, Change::InsertWorkspaceGroupAccess(row.clone())).await;
    row
}
