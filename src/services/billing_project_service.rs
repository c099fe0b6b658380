//! 计费项目服务

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::error::{AppError, Result};
use crate::models::billing_project::{BillingProject, ImportBillingProjectRequest};
use crate::remote::AnvilApi;
use crate::repository::{Change, Store};

pub const MESSAGE_IMPORTED: &str = "Successfully imported Billing Project from AnVIL.";
pub const MESSAGE_NOT_USERS_OF_PROJECT: &str =
    "Not a user of requested billing project or it doesn't exist on AnVIL.";
pub const MESSAGE_ALREADY_EXISTS: &str = "Billing project with this name already exists.";
pub const MESSAGE_HAS_WORKSPACES: &str =
    "Cannot delete billing project because it has workspaces in the app.";
pub const MESSAGE_DELETED: &str = "Successfully deleted Billing Project from the app.";
pub const MESSAGE_REFRESHED: &str = "Successfully refreshed Billing Project status from AnVIL.";

pub struct BillingProjectService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
}

impl BillingProjectService {
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

    /// 导入远端已存在、且服务账户为其用户的计费项目
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn import(
        &self,
        request: ImportBillingProjectRequest,
    ) -> Result<Committed<BillingProject>> {
        request.validate()?;

        if self.store.billing_project_by_name(&request.name).await?.is_some() {
            return Err(AppError::field("name", MESSAGE_ALREADY_EXISTS));
        }

        if !self.api.check_billing_project(&request.name).await? {
            warn!("App is not a user of the billing project");
            return Err(AppError::inconsistent(MESSAGE_NOT_USERS_OF_PROJECT));
        }

        let billing_project = BillingProject::new(&request.name, true);
        self.audit_service
            .commit(
                Change::InsertBillingProject(billing_project.clone()).into(),
                AuditAction::BillingProjectImport,
            )
            .await?;

        info!(billing_project_id = %billing_project.id, "Billing project imported");
        Ok(Committed::new(MESSAGE_IMPORTED, billing_project))
    }

    /// 重新查询服务账户是否为计费项目的用户
    #[instrument(skip(self))]
    pub async fn refresh(&self, name: &str) -> Result<Committed<BillingProject>> {
        let before = self.get(name).await?;
        let has_app_as_user = self.api.check_billing_project(&before.name).await?;

        if has_app_as_user == before.has_app_as_user {
            return Ok(Committed::new(MESSAGE_REFRESHED, before));
        }

        let after = BillingProject {
            has_app_as_user,
            updated_at: Utc::now(),
            ..before.clone()
        };
        self.audit_service
            .commit(
                Change::UpdateBillingProject {
                    before,
                    after: after.clone(),
                }
                .into(),
                AuditAction::BillingProjectUpdate,
            )
            .await?;

        info!(has_app_as_user, "Billing project status refreshed");
        Ok(Committed::new(MESSAGE_REFRESHED, after))
    }

    /// 只删除本地记录；远端计费项目不受影响
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<Committed<BillingProject>> {
        let billing_project = self.get(name).await?;

        if !self
            .store
            .workspaces_in_billing_project(billing_project.id)
            .await?
            .is_empty()
        {
            return Err(AppError::blocked(MESSAGE_HAS_WORKSPACES));
        }

        self.audit_service
            .commit(
                Change::DeleteBillingProject(billing_project.clone()).into(),
                AuditAction::BillingProjectDelete,
            )
            .await?;

        info!(billing_project_id = %billing_project.id, "Billing project deleted locally");
        Ok(Committed::new(MESSAGE_DELETED, billing_project))
    }

    pub async fn get(&self, name: &str) -> Result<BillingProject> {
        self.store
            .billing_project_by_name(name)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("billing project {}", name)))
    }

    pub async fn list(&self) -> Result<Vec<BillingProject>> {
        self.store.list_billing_projects().await
    }
}
