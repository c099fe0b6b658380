//! 工作区服务
//! 创建、导入、克隆、删除，以及基于组嵌套关系的访问查询

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::adapters::AdapterRegistry;
use crate::error::{AppError, Result};
use crate::models::workspace::{
    workspace_key, CreateWorkspaceRequest, ImportWorkspaceRequest, WorkspaceListFilters,
};
use crate::models::*;
use crate::remote::AnvilApi;
use crate::repository::{Change, ChangeSet, Store};

pub const MESSAGE_CREATED: &str = "Successfully created Workspace on AnVIL.";
pub const MESSAGE_IMPORTED: &str = "Successfully imported Workspace from AnVIL.";
pub const MESSAGE_CLONED: &str = "Successfully cloned Workspace on AnVIL.";
pub const MESSAGE_DELETED: &str = "Successfully deleted Workspace on AnVIL.";
pub const MESSAGE_ALREADY_EXISTS: &str = "Workspace with this Billing Project and Name already exists.";
pub const MESSAGE_ALREADY_IMPORTED: &str = "This workspace already exists in the web app.";
pub const MESSAGE_NO_ACCESS: &str =
    "Requested workspace doesn't exist or you don't have permission to see it.";
pub const MESSAGE_NOT_OWNER: &str = "Not an owner of this workspace.";
pub const MESSAGE_UNKNOWN_BILLING_PROJECT: &str = "Select a valid billing project.";
pub const MESSAGE_APP_NOT_USER: &str = "The app is not a user of this billing project.";
pub const MESSAGE_MISSING_AUTH_DOMAINS: &str =
    "Must contain all original workspace authorization domains.";

pub struct WorkspaceService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
    adapters: Arc<AdapterRegistry>,
}

impl WorkspaceService {
    pub fn new(
        store: Arc<dyn Store>,
        api: Arc<dyn AnvilApi>,
        audit_service: Arc<AuditService>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            store,
            api,
            audit_service,
            adapters,
        }
    }

    /// 按适配器校验附加数据
    fn validate_data(&self, workspace_type: &str, data: &serde_json::Value) -> Result<serde_json::Value> {
        let adapter = self.adapters.get(workspace_type)?;
        Ok(adapter.validate_data(data)?)
    }

    /// 目标计费项目必须已在本地，且服务账户是其用户
    async fn target_billing_project(&self, name: &str) -> Result<BillingProject> {
        let billing_project = self
            .store
            .billing_project_by_name(name)
            .await?
            .ok_or_else(|| AppError::field("billing_project", MESSAGE_UNKNOWN_BILLING_PROJECT))?;
        if !billing_project.has_app_as_user {
            return Err(AppError::field("billing_project", MESSAGE_APP_NOT_USER));
        }
        Ok(billing_project)
    }

    async fn ensure_absent(&self, billing_project: &BillingProject, name: &str) -> Result<()> {
        if self
            .store
            .workspace_by_name(billing_project.id, name)
            .await?
            .is_some()
        {
            return Err(AppError::field("name", MESSAGE_ALREADY_EXISTS));
        }
        Ok(())
    }

    /// 把授权域名称解析为本地组，去重并保持顺序
    async fn resolve_groups(&self, names: &[String]) -> Result<Vec<ManagedGroup>> {
        let mut groups: Vec<ManagedGroup> = Vec::with_capacity(names.len());
        for name in names {
            let group = self.store.managed_group_by_name(name).await?.ok_or_else(|| {
                AppError::field(
                    "authorization_domains",
                    &format!("Managed group {} does not exist.", name),
                )
            })?;
            if !groups.iter().any(|g| g.id == group.id) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// 新工作区的全部本地行：工作区、授权域、附加数据
    fn workspace_rows(
        workspace: &Workspace,
        auth_domains: &[ManagedGroup],
        data: serde_json::Value,
    ) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.push(Change::InsertWorkspace(workspace.clone()));
        for group in auth_domains {
            changes.push(Change::InsertAuthorizationDomain(
                WorkspaceAuthorizationDomain::new(workspace.id, group.id),
            ));
        }
        changes.push(Change::InsertWorkspaceData(WorkspaceData::new(
            workspace.id,
            &workspace.workspace_type,
            data,
        )));
        changes
    }

    /// 在远端创建工作区，授权域随创建请求一并发送
    #[instrument(skip(self, request), fields(billing_project = %request.billing_project, name = %request.name))]
    pub async fn create(&self, request: CreateWorkspaceRequest) -> Result<Committed<WorkspaceDetail>> {
        request.validate()?;
        let data = self.validate_data(&request.workspace_type, &request.data)?;
        let billing_project = self.target_billing_project(&request.billing_project).await?;
        self.ensure_absent(&billing_project, &request.name).await?;
        let auth_domains = self.resolve_groups(&request.authorization_domains).await?;

        let auth_domain_names: Vec<String> = auth_domains.iter().map(|g| g.name.clone()).collect();
        self.api
            .create_workspace(&billing_project.name, &request.name, &auth_domain_names)
            .await?;

        let workspace = Workspace::new(billing_project.id, &request.name, &request.workspace_type);
        self.audit_service
            .commit(
                Self::workspace_rows(&workspace, &auth_domains, data.clone()),
                AuditAction::WorkspaceCreate,
            )
            .await?;

        info!(workspace_id = %workspace.id, "Workspace created");
        Ok(Committed::new(
            MESSAGE_CREATED,
            WorkspaceDetail {
                workspace,
                billing_project: billing_project.name,
                authorization_domains: auth_domains,
                data: Some(data),
            },
        ))
    }

    /// 可导入的远端工作区："namespace/name"，仅限服务账户为 OWNER 且本地不存在的
    #[instrument(skip(self))]
    pub async fn importable(&self) -> Result<Vec<String>> {
        let remote = self.api.list_workspaces().await?;

        let mut keys = Vec::new();
        for workspace in remote.into_iter().filter(|w| w.is_owner()) {
            let exists = match self.store.billing_project_by_name(&workspace.namespace).await? {
                Some(bp) => self
                    .store
                    .workspace_by_name(bp.id, &workspace.name)
                    .await?
                    .is_some(),
                None => false,
            };
            if !exists {
                keys.push(workspace_key(&workspace.namespace, &workspace.name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// 导入服务账户拥有的远端工作区
    ///
    /// 缺失的计费项目和授权域组会一并在本地创建。
    #[instrument(skip(self, request), fields(billing_project = %request.billing_project, name = %request.name))]
    pub async fn import(&self, request: ImportWorkspaceRequest) -> Result<Committed<WorkspaceDetail>> {
        request.validate()?;
        let data = self.validate_data(&request.workspace_type, &request.data)?;

        let existing_billing_project = self
            .store
            .billing_project_by_name(&request.billing_project)
            .await?;
        if let Some(bp) = &existing_billing_project {
            if self.store.workspace_by_name(bp.id, &request.name).await?.is_some() {
                return Err(AppError::validation(MESSAGE_ALREADY_IMPORTED));
            }
        }

        let remote = match self
            .api
            .get_workspace(&request.billing_project, &request.name)
            .await
        {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => return Err(AppError::inconsistent(MESSAGE_NO_ACCESS)),
            Err(e) => return Err(e.into()),
        };
        if !remote.is_owner() {
            warn!(access_level = %remote.access_level, "App does not own the workspace");
            return Err(AppError::inconsistent(MESSAGE_NOT_OWNER));
        }

        let mut changes = ChangeSet::new();
        let billing_project = match existing_billing_project {
            Some(bp) => bp,
            None => {
                let has_app_as_user = self
                    .api
                    .check_billing_project(&remote.namespace)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Billing project check failed; recording no access");
                        false
                    });
                let bp = BillingProject::new(&remote.namespace, has_app_as_user);
                changes.push(Change::InsertBillingProject(bp.clone()));
                bp
            }
        };

        let mut auth_domains = Vec::new();
        for name in &remote.authorization_domains {
            let group = match self.store.managed_group_by_name(name).await? {
                Some(group) => group,
                None => {
                    let group = ManagedGroup::new(name, false);
                    changes.push(Change::InsertManagedGroup(group.clone()));
                    group
                }
            };
            auth_domains.push(group);
        }

        let workspace = Workspace::new(billing_project.id, &remote.name, &request.workspace_type);
        changes.extend(Self::workspace_rows(&workspace, &auth_domains, data.clone()));
        self.audit_service
            .commit(changes, AuditAction::WorkspaceImport)
            .await?;

        info!(workspace_id = %workspace.id, "Workspace imported");
        Ok(Committed::new(
            MESSAGE_IMPORTED,
            WorkspaceDetail {
                workspace,
                billing_project: billing_project.name,
                authorization_domains: auth_domains,
                data: Some(data),
            },
        ))
    }

    /// 克隆工作区；新工作区的授权域必须包含源工作区的全部授权域
    #[instrument(skip(self, request), fields(target = %request.name))]
    pub async fn clone_workspace(
        &self,
        source_billing_project: &str,
        source_name: &str,
        request: CreateWorkspaceRequest,
    ) -> Result<Committed<WorkspaceDetail>> {
        request.validate()?;
        let source = self.detail(source_billing_project, source_name).await?;
        let data = self.validate_data(&request.workspace_type, &request.data)?;
        let billing_project = self.target_billing_project(&request.billing_project).await?;
        self.ensure_absent(&billing_project, &request.name).await?;
        let auth_domains = self.resolve_groups(&request.authorization_domains).await?;

        let requested: HashSet<Uuid> = auth_domains.iter().map(|g| g.id).collect();
        if source
            .authorization_domains
            .iter()
            .any(|g| !requested.contains(&g.id))
        {
            return Err(AppError::field(
                "authorization_domains",
                MESSAGE_MISSING_AUTH_DOMAINS,
            ));
        }

        let auth_domain_names: Vec<String> = auth_domains.iter().map(|g| g.name.clone()).collect();
        self.api
            .clone_workspace(
                &source.billing_project,
                &source.workspace.name,
                &billing_project.name,
                &request.name,
                &auth_domain_names,
            )
            .await?;

        let workspace = Workspace::new(billing_project.id, &request.name, &request.workspace_type);
        self.audit_service
            .commit(
                Self::workspace_rows(&workspace, &auth_domains, data.clone()),
                AuditAction::WorkspaceClone,
            )
            .await?;

        info!(workspace_id = %workspace.id, source_id = %source.workspace.id, "Workspace cloned");
        Ok(Committed::new(
            MESSAGE_CLONED,
            WorkspaceDetail {
                workspace,
                billing_project: billing_project.name,
                authorization_domains: auth_domains,
                data: Some(data),
            },
        ))
    }

    /// 删除远端工作区，成功后删除全部本地关联行
    #[instrument(skip(self))]
    pub async fn delete(&self, billing_project: &str, name: &str) -> Result<Committed<Workspace>> {
        let detail = self.detail(billing_project, name).await?;
        let workspace = detail.workspace;

        self.api
            .delete_workspace(&detail.billing_project, &workspace.name)
            .await?;

        let mut changes = ChangeSet::new();
        for access in self
            .store
            .workspace_group_accesses_for_workspace(workspace.id)
            .await?
        {
            changes.push(Change::DeleteWorkspaceGroupAccess(access));
        }
        for domain in self.store.authorization_domains(workspace.id).await? {
            changes.push(Change::DeleteAuthorizationDomain(domain));
        }
        if let Some(data) = self.store.workspace_data(workspace.id).await? {
            changes.push(Change::DeleteWorkspaceData(data));
        }
        changes.push(Change::DeleteWorkspace(workspace.clone()));
        self.audit_service
            .commit(changes, AuditAction::WorkspaceDelete)
            .await?;

        info!(workspace_id = %workspace.id, "Workspace deleted");
        Ok(Committed::new(MESSAGE_DELETED, workspace))
    }

    pub async fn get(&self, billing_project: &str, name: &str) -> Result<Workspace> {
        let bp = self
            .store
            .billing_project_by_name(billing_project)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("billing project {}", billing_project)))?;
        self.store
            .workspace_by_name(bp.id, name)
            .await?
            .ok_or_else(|| {
                AppError::not_found(&format!("workspace {}", workspace_key(billing_project, name)))
            })
    }

    /// 工作区及其计费项目、授权域、附加数据
    pub async fn detail(&self, billing_project: &str, name: &str) -> Result<WorkspaceDetail> {
        let workspace = self.get(billing_project, name).await?;
        self.describe(workspace).await
    }

    async fn describe(&self, workspace: Workspace) -> Result<WorkspaceDetail> {
        let billing_project = self
            .store
            .billing_project_by_id(workspace.billing_project_id)
            .await?
            .ok_or_else(|| AppError::internal_error("workspace without billing project"))?;

        let mut authorization_domains = Vec::new();
        for domain in self.store.authorization_domains(workspace.id).await? {
            if let Some(group) = self.store.managed_group_by_id(domain.group_id).await? {
                authorization_domains.push(group);
            }
        }
        let data = self
            .store
            .workspace_data(workspace.id)
            .await?
            .map(|d| d.data);

        Ok(WorkspaceDetail {
            workspace,
            billing_project: billing_project.name,
            authorization_domains,
            data,
        })
    }

    pub async fn list(&self, filters: &WorkspaceListFilters) -> Result<Vec<WorkspaceDetail>> {
        let mut details = Vec::new();
        for workspace in self.store.list_workspaces().await? {
            if let Some(workspace_type) = &filters.workspace_type {
                if &workspace.workspace_type != workspace_type {
                    continue;
                }
            }
            let detail = self.describe(workspace).await?;
            if let Some(bp) = &filters.billing_project {
                if !detail.billing_project.eq_ignore_ascii_case(bp) {
                    continue;
                }
            }
            details.push(detail);
        }
        Ok(details)
    }

    async fn group_and_ancestors(&self, group: &str) -> Result<(ManagedGroup, HashSet<Uuid>)> {
        let group = self
            .store
            .managed_group_by_name(group)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("managed group {}", group)))?;
        let edges = self.store.group_group_memberships().await?;
        let mut ids = GroupGraph::from_edges(&edges).ancestors(group.id);
        ids.insert(group.id);
        Ok((group, ids))
    }

    /// 组是否（直接或通过嵌套）属于工作区的全部授权域
    pub async fn is_in_authorization_domain(
        &self,
        billing_project: &str,
        name: &str,
        group: &str,
    ) -> Result<bool> {
        let workspace = self.get(billing_project, name).await?;
        let (_, ids) = self.group_and_ancestors(group).await?;
        let domains = self.store.authorization_domains(workspace.id).await?;
        Ok(domains.iter().all(|d| ids.contains(&d.group_id)))
    }

    /// 工作区是否（直接或通过父组）共享给了该组
    pub async fn is_shared(&self, billing_project: &str, name: &str, group: &str) -> Result<bool> {
        let workspace = self.get(billing_project, name).await?;
        let (_, ids) = self.group_and_ancestors(group).await?;
        let accesses = self
            .store
            .workspace_group_accesses_for_workspace(workspace.id)
            .await?;
        Ok(accesses.iter().any(|a| ids.contains(&a.group_id)))
    }

    /// 同时满足授权域与共享两个条件
    pub async fn has_access(&self, billing_project: &str, name: &str, group: &str) -> Result<bool> {
        Ok(self.is_in_authorization_domain(billing_project, name, group).await?
            && self.is_shared(billing_project, name, group).await?)
    }
}
