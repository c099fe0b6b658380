//! 一致性检查服务
//! 只读地比对本地记录与远端状态，不修改任何一方

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::workspace::workspace_key;
use crate::remote::{AccountLookup, AnvilApi};
use crate::repository::Store;

pub const ERROR_NOT_IN_ANVIL: &str = "Not in AnVIL";
pub const ERROR_DIFFERENT_ROLE: &str = "App has a different role in this group";
pub const ERROR_NOT_OWNER_ON_ANVIL: &str = "Not an owner on AnVIL";
pub const ERROR_DIFFERENT_AUTH_DOMAINS: &str = "Has different auth domains on AnVIL";

/// 某一类实体的检查结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    /// 与远端一致的记录
    pub verified: Vec<String>,
    /// 记录 -> 错误原因
    pub errors: BTreeMap<String, Vec<&'static str>>,
    /// 远端存在但本地没有的记录
    pub not_in_app: Vec<String>,
}

impl ConsistencyReport {
    fn add(&mut self, key: String, reasons: Vec<&'static str>) {
        if reasons.is_empty() {
            self.verified.push(key);
        } else {
            self.errors.insert(key, reasons);
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty() && self.not_in_app.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FullConsistencyReport {
    pub billing_projects: ConsistencyReport,
    pub accounts: ConsistencyReport,
    pub managed_groups: ConsistencyReport,
    pub workspaces: ConsistencyReport,
}

impl FullConsistencyReport {
    pub fn ok(&self) -> bool {
        self.billing_projects.ok()
            && self.accounts.ok()
            && self.managed_groups.ok()
            && self.workspaces.ok()
    }
}

pub struct ConsistencyService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
}

impl ConsistencyService {
    pub fn new(store: Arc<dyn Store>, api: Arc<dyn AnvilApi>) -> Self {
        Self { store, api }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<FullConsistencyReport> {
        let report = FullConsistencyReport {
            billing_projects: self.billing_projects().await?,
            accounts: self.accounts().await?,
            managed_groups: self.managed_groups().await?,
            workspaces: self.workspaces().await?,
        };
        if report.ok() {
            info!("Consistency check passed");
        } else {
            warn!(
                billing_project_errors = report.billing_projects.errors.len(),
                account_errors = report.accounts.errors.len(),
                managed_group_errors = report.managed_groups.errors.len(),
                workspace_errors = report.workspaces.errors.len(),
                "Consistency check found differences"
            );
        }
        Ok(report)
    }

    /// 只检查应用是其用户的计费项目
    pub async fn billing_projects(&self) -> Result<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        for bp in self.store.list_billing_projects().await? {
            if !bp.has_app_as_user {
                continue;
            }
            let mut reasons = Vec::new();
            if !self.api.check_billing_project(&bp.name).await? {
                reasons.push(ERROR_NOT_IN_ANVIL);
            }
            report.add(bp.name, reasons);
        }
        Ok(report)
    }

    /// 只检查活跃账户
    pub async fn accounts(&self) -> Result<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        for account in self.store.list_accounts().await? {
            if !account.is_active() {
                continue;
            }
            let mut reasons = Vec::new();
            if self.api.check_account(&account.email).await? == AccountLookup::NotFound {
                reasons.push(ERROR_NOT_IN_ANVIL);
            }
            report.add(account.email, reasons);
        }
        Ok(report)
    }

    pub async fn managed_groups(&self) -> Result<ConsistencyReport> {
        // 同一个组可能同时以 Member 和 Admin 出现
        let mut remote: HashMap<String, (String, bool)> = HashMap::new();
        for group in self.api.list_my_groups().await? {
            let entry = remote
                .entry(group.group_name.to_lowercase())
                .or_insert_with(|| (group.group_name.clone(), false));
            entry.1 |= group.is_admin();
        }

        let mut report = ConsistencyReport::default();
        for group in self.store.list_managed_groups().await? {
            let mut reasons = Vec::new();
            match remote.remove(&group.name.to_lowercase()) {
                Some((_, is_admin)) => {
                    if is_admin != group.is_managed_by_app {
                        reasons.push(ERROR_DIFFERENT_ROLE);
                    }
                }
                None => {
                    // 不在列表中：可能组存在但应用不是成员
                    if self.api.group_exists(&group.name).await? {
                        if group.is_managed_by_app {
                            reasons.push(ERROR_DIFFERENT_ROLE);
                        }
                    } else {
                        reasons.push(ERROR_NOT_IN_ANVIL);
                    }
                }
            }
            report.add(group.name, reasons);
        }

        // 只报告应用是管理员的远端组
        let mut not_in_app: Vec<String> = remote
            .into_values()
            .filter(|(_, is_admin)| *is_admin)
            .map(|(name, _)| name)
            .collect();
        not_in_app.sort();
        report.not_in_app = not_in_app;
        Ok(report)
    }

    pub async fn workspaces(&self) -> Result<ConsistencyReport> {
        let mut remote: HashMap<String, _> = self
            .api
            .list_workspaces()
            .await?
            .into_iter()
            .map(|w| (workspace_key(&w.namespace, &w.name).to_lowercase(), w))
            .collect();

        let mut report = ConsistencyReport::default();
        for workspace in self.store.list_workspaces().await? {
            let billing_project = match self
                .store
                .billing_project_by_id(workspace.billing_project_id)
                .await?
            {
                Some(bp) => bp,
                None => continue,
            };
            let key = workspace_key(&billing_project.name, &workspace.name);

            let mut reasons = Vec::new();
            match remote.remove(&key.to_lowercase()) {
                None => reasons.push(ERROR_NOT_IN_ANVIL),
                Some(remote_workspace) => {
                    if !remote_workspace.is_owner() {
                        reasons.push(ERROR_NOT_OWNER_ON_ANVIL);
                    }
                    let mut local_domains = BTreeSet::new();
                    for domain in self.store.authorization_domains(workspace.id).await? {
                        if let Some(group) = self.store.managed_group_by_id(domain.group_id).await? {
                            local_domains.insert(group.name.to_lowercase());
                        }
                    }
                    let remote_domains: BTreeSet<String> = remote_workspace
                        .authorization_domains
                        .iter()
                        .map(|d| d.to_lowercase())
                        .collect();
                    if local_domains != remote_domains {
                        reasons.push(ERROR_DIFFERENT_AUTH_DOMAINS);
                    }
                }
            }
            report.add(key, reasons);
        }

        let mut not_in_app: Vec<String> = remote
            .into_values()
            .filter(|w| w.is_owner())
            .map(|w| workspace_key(&w.namespace, &w.name))
            .collect();
        not_in_app.sort();
        report.not_in_app = not_in_app;
        Ok(report)
    }
}
