//! 托管组服务

use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::error::{AppError, Result};
use crate::models::managed_group::{ManagedGroup, ManagedGroupRequest};
use crate::remote::AnvilApi;
use crate::repository::{Change, ChangeSet, Store};

pub const MESSAGE_CREATED: &str = "Successfully created Managed Group on AnVIL.";
pub const MESSAGE_IMPORTED: &str = "Successfully imported Managed Group from AnVIL.";
pub const MESSAGE_DELETED: &str = "Successfully deleted Group on AnVIL.";
pub const MESSAGE_ALREADY_EXISTS: &str = "Managed group with this name already exists.";
pub const MESSAGE_NOT_MEMBER: &str = "Not a member of this group on AnVIL.";
pub const MESSAGE_NOT_MANAGED_BY_APP: &str =
    "Cannot delete group because it is not managed by this app.";
pub const MESSAGE_IS_AUTH_DOMAIN: &str =
    "Cannot delete group since it is an authorization domain for a workspace.";
pub const MESSAGE_IS_MEMBER_OF_ANOTHER_GROUP: &str =
    "Cannot delete group since it is a member of another group.";
pub const MESSAGE_HAS_ACCESS_TO_WORKSPACE: &str =
    "Cannot delete group because it has access to at least one workspace.";
pub const MESSAGE_COULD_NOT_DELETE: &str = "Could not delete group from AnVIL - unknown reason.";

pub struct ManagedGroupService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
}

impl ManagedGroupService {
    pub fn new(
        store: Arc<dyn Store>,
        api: Arc<dyn AnvilApi>,
        audit_service: Arc<AuditService>,
    ) -> Self {
        Self {
            store,
            api,
            audit_service,
        }
    }

    async fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.store.managed_group_by_name(name).await?.is_some() {
            return Err(AppError::field("name", MESSAGE_ALREADY_EXISTS));
        }
        Ok(())
    }

    /// 在远端创建组，服务账户成为管理员
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: ManagedGroupRequest) -> Result<Committed<ManagedGroup>> {
        request.validate()?;
        self.ensure_absent(&request.name).await?;

        self.api.create_group(&request.name).await?;

        let group = ManagedGroup::new(&request.name, true);
        self.audit_service
            .commit(
                Change::InsertManagedGroup(group.clone()).into(),
                AuditAction::ManagedGroupCreate,
            )
            .await?;

        info!(group_id = %group.id, "Managed group created");
        Ok(Committed::new(MESSAGE_CREATED, group))
    }

    /// 导入服务账户所在的远端组；是否由本应用管理取决于远端角色
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn import(&self, request: ManagedGroupRequest) -> Result<Committed<ManagedGroup>> {
        request.validate()?;
        self.ensure_absent(&request.name).await?;

        let remote_groups = self.api.list_my_groups().await?;
        let entries: Vec<_> = remote_groups
            .iter()
            .filter(|g| g.group_name.eq_ignore_ascii_case(&request.name))
            .collect();
        if entries.is_empty() {
            warn!("App is not a member of the group");
            return Err(AppError::inconsistent(MESSAGE_NOT_MEMBER));
        }
        let is_managed_by_app = entries.iter().any(|g| g.is_admin());

        let group = ManagedGroup::new(&entries[0].group_name, is_managed_by_app);
        self.audit_service
            .commit(
                Change::InsertManagedGroup(group.clone()).into(),
                AuditAction::ManagedGroupImport,
            )
            .await?;

        info!(group_id = %group.id, is_managed_by_app, "Managed group imported");
        Ok(Committed::new(MESSAGE_IMPORTED, group))
    }

    /// 删除组
    ///
    /// 远端删除请求即使返回成功，也要再查询一次确认组已不存在。
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<Committed<ManagedGroup>> {
        let group = self.get(name).await?;

        if !group.is_managed_by_app {
            return Err(AppError::blocked(MESSAGE_NOT_MANAGED_BY_APP));
        }
        if !self
            .store
            .authorization_domains_for_group(group.id)
            .await?
            .is_empty()
        {
            return Err(AppError::blocked(MESSAGE_IS_AUTH_DOMAIN));
        }

        let edges = self.store.group_group_memberships().await?;
        if edges.iter().any(|m| m.child_group_id == group.id) {
            return Err(AppError::blocked(MESSAGE_IS_MEMBER_OF_ANOTHER_GROUP));
        }
        if !self
            .store
            .workspace_group_accesses_for_group(group.id)
            .await?
            .is_empty()
        {
            return Err(AppError::blocked(MESSAGE_HAS_ACCESS_TO_WORKSPACE));
        }

        self.api.delete_group(&group.name).await?;

        if self.api.group_exists(&group.name).await? {
            error!(group = %group.name, "Group still exists on AnVIL after delete");
            return Err(AppError::inconsistent(MESSAGE_COULD_NOT_DELETE));
        }

        let mut changes = ChangeSet::new();
        for edge in edges.into_iter().filter(|m| m.parent_group_id == group.id) {
            changes.push(Change::DeleteGroupGroupMembership(edge));
        }
        for membership in self
            .store
            .group_account_memberships_for_group(group.id)
            .await?
        {
            changes.push(Change::DeleteGroupAccountMembership(membership));
        }
        changes.push(Change::DeleteManagedGroup(group.clone()));
        self.audit_service
            .commit(changes, AuditAction::ManagedGroupDelete)
            .await?;

        info!(group_id = %group.id, "Managed group deleted");
        Ok(Committed::new(MESSAGE_DELETED, group))
    }

    pub async fn get(&self, name: &str) -> Result<ManagedGroup> {
        self.store
            .managed_group_by_name(name)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("managed group {}", name)))
    }

    pub async fn list(&self) -> Result<Vec<ManagedGroup>> {
        self.store.list_managed_groups().await
    }
}
