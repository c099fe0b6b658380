//! 工作区共享服务
//! 每次变更都是对远端 ACL 的单条 PATCH，只有响应确认了该组才提交本地

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::error::{AppError, Result};
use crate::models::access::{
    check_compute_allowed, GrantAccessRequest, UpdateAccessRequest, NO_ACCESS,
};
use crate::models::workspace::workspace_key;
use crate::models::*;
use crate::remote::{AclEntry, AclPatchResponse, AnvilApi};
use crate::repository::{Change, Store};

pub const MESSAGE_SHARED: &str = "Successfully shared Workspace with Group.";
pub const MESSAGE_UPDATED: &str = "Successfully updated Workspace sharing.";
pub const MESSAGE_REMOVED: &str = "Successfully removed workspace sharing on AnVIL.";
pub const MESSAGE_READER_CANNOT_COMPUTE: &str = "READERs cannot be granted compute privileges.";
pub const MESSAGE_ALREADY_SHARED: &str =
    "Workspace group sharing with this Workspace and Group already exists.";
pub const MESSAGE_GROUP_NOT_FOUND: &str = "Managed Group not found on AnVIL.";
pub const MESSAGE_NOT_CONFIRMED: &str = "AnVIL did not confirm the sharing change for this group.";

pub struct WorkspaceAccessService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
}

struct Target {
    billing_project: BillingProject,
    workspace: Workspace,
    group: ManagedGroup,
}

impl WorkspaceAccessService {
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

    async fn target(&self, billing_project: &str, name: &str, group: &str) -> Result<Target> {
        let not_found = || AppError::not_found(&format!("workspace {}", workspace_key(billing_project, name)));
        let bp = self
            .store
            .billing_project_by_name(billing_project)
            .await?
            .ok_or_else(not_found)?;
        let workspace = self
            .store
            .workspace_by_name(bp.id, name)
            .await?
            .ok_or_else(not_found)?;
        let group = self
            .store
            .managed_group_by_name(group)
            .await?
            .ok_or_else(|| AppError::field("group", &format!("Managed group {} does not exist.", group)))?;
        Ok(Target {
            billing_project: bp,
            workspace,
            group,
        })
    }

    async fn existing(&self, target: &Target) -> Result<Option<WorkspaceGroupAccess>> {
        Ok(self
            .store
            .workspace_group_accesses_for_workspace(target.workspace.id)
            .await?
            .into_iter()
            .find(|a| a.group_id == target.group.id))
    }

    /// 发送单条 ACL PATCH，返回组邮箱和远端响应
    async fn send_patch(
        &self,
        target: &Target,
        access_level: &str,
        can_compute: bool,
    ) -> Result<(String, AclPatchResponse)> {
        let email = target.group.email(self.api.group_email_domain());
        let entry = AclEntry {
            email: email.clone(),
            access_level: access_level.to_string(),
            can_share: false,
            can_compute,
        };

        let response = self
            .api
            .patch_acl(&target.billing_project.name, &target.workspace.name, &[entry])
            .await?;
        Ok((email, response))
    }

    /// 授予或修改共享：响应必须确认该组已更新
    async fn patch(&self, target: &Target, access_level: &str, can_compute: bool) -> Result<()> {
        let (email, response) = self.send_patch(target, access_level, can_compute).await?;

        if response.not_found(&email) {
            warn!(group = %target.group.name, "Group not found on AnVIL during ACL update");
            return Err(AppError::inconsistent(MESSAGE_GROUP_NOT_FOUND));
        }
        if !response.updated(&email) {
            warn!(group = %target.group.name, "ACL update response did not include the group");
            return Err(AppError::inconsistent(MESSAGE_NOT_CONFIRMED));
        }
        Ok(())
    }

    /// 把工作区共享给托管组
    #[instrument(skip(self, request), fields(group = %request.group, access = %request.access))]
    pub async fn grant(
        &self,
        billing_project: &str,
        name: &str,
        request: GrantAccessRequest,
    ) -> Result<Committed<WorkspaceGroupAccess>> {
        request.validate()?;
        if !check_compute_allowed(request.access, request.can_compute) {
            return Err(AppError::field("can_compute", MESSAGE_READER_CANNOT_COMPUTE));
        }
        let target = self.target(billing_project, name, &request.group).await?;
        if self.existing(&target).await?.is_some() {
            return Err(AppError::validation(MESSAGE_ALREADY_SHARED));
        }

        self.patch(&target, request.access.as_str(), request.can_compute)
            .await?;

        let access = WorkspaceGroupAccess::new(
            target.workspace.id,
            target.group.id,
            request.access,
            request.can_compute,
        );
        self.audit_service
            .commit(
                Change::InsertWorkspaceGroupAccess(access.clone()).into(),
                AuditAction::WorkspaceAccessCreate,
            )
            .await?;

        info!(access_id = %access.id, "Workspace shared with group");
        Ok(Committed::new(MESSAGE_SHARED, access))
    }

    /// 修改访问级别或计算权限
    #[instrument(skip(self, request), fields(access = %request.access))]
    pub async fn update(
        &self,
        billing_project: &str,
        name: &str,
        group: &str,
        request: UpdateAccessRequest,
    ) -> Result<Committed<WorkspaceGroupAccess>> {
        if !check_compute_allowed(request.access, request.can_compute) {
            return Err(AppError::field("can_compute", MESSAGE_READER_CANNOT_COMPUTE));
        }
        let target = self.target(billing_project, name, group).await?;
        let before = self.existing(&target).await?.ok_or_else(|| {
            AppError::not_found(&format!("sharing of {} with {}", target.workspace.name, group))
        })?;

        self.patch(&target, request.access.as_str(), request.can_compute)
            .await?;

        let after = WorkspaceGroupAccess {
            access: request.access,
            can_compute: request.can_compute,
            updated_at: Utc::now(),
            ..before.clone()
        };
        self.audit_service
            .commit(
                Change::UpdateWorkspaceGroupAccess {
                    before,
                    after: after.clone(),
                }
                .into(),
                AuditAction::WorkspaceAccessUpdate,
            )
            .await?;

        info!(access_id = %after.id, "Workspace sharing updated");
        Ok(Committed::new(MESSAGE_UPDATED, after))
    }

    /// 撤销共享：远端设置为 NO ACCESS，保留原有的 can_compute
    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        billing_project: &str,
        name: &str,
        group: &str,
    ) -> Result<Committed<WorkspaceGroupAccess>> {
        let target = self.target(billing_project, name, group).await?;
        let access = self.existing(&target).await?.ok_or_else(|| {
            AppError::not_found(&format!("sharing of {} with {}", target.workspace.name, group))
        })?;

        // 远端已不存在的组视为撤销完成
        let (email, response) = self
            .send_patch(&target, NO_ACCESS, access.can_compute)
            .await?;
        if response.not_found(&email) {
            warn!(group = %target.group.name, "Group not found on AnVIL; removing local sharing");
        } else if !response.updated(&email) {
            warn!(group = %target.group.name, "ACL update response did not include the group");
            return Err(AppError::inconsistent(MESSAGE_NOT_CONFIRMED));
        }

        self.audit_service
            .commit(
                Change::DeleteWorkspaceGroupAccess(access.clone()).into(),
                AuditAction::WorkspaceAccessDelete,
            )
            .await?;

        info!(access_id = %access.id, "Workspace sharing removed");
        Ok(Committed::new(MESSAGE_REMOVED, access))
    }

    pub async fn list_for_workspace(
        &self,
        billing_project: &str,
        name: &str,
    ) -> Result<Vec<WorkspaceGroupAccess>> {
        let bp = self
            .store
            .billing_project_by_name(billing_project)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("billing project {}", billing_project)))?;
        let workspace = self
            .store
            .workspace_by_name(bp.id, name)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("workspace {}", workspace_key(billing_project, name))))?;
        self.store
            .workspace_group_accesses_for_workspace(workspace.id)
            .await
    }
}
