//! 账户服务
//! 导入、停用、重新启用与删除；停用/启用会同步远端组成员关系

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::error::{AppError, Result, SyncAction};
use crate::models::account::{Account, AccountStatus, ImportAccountRequest};
use crate::models::{GroupAccountMembership, ManagedGroup};
use crate::remote::{AccountLookup, AnvilApi};
use crate::repository::{Change, ChangeSet, Store};

pub const MESSAGE_IMPORTED: &str = "Successfully imported Account from AnVIL.";
pub const MESSAGE_DOES_NOT_EXIST: &str = "This account does not exist on AnVIL.";
pub const MESSAGE_ALREADY_EXISTS: &str = "Account with this email already exists.";
pub const MESSAGE_ALREADY_INACTIVE: &str = "This Account is already inactive.";
pub const MESSAGE_ALREADY_ACTIVE: &str = "This Account is already active.";
pub const MESSAGE_DEACTIVATED: &str = "Successfully deactivated Account in app.";
pub const MESSAGE_REACTIVATED: &str = "Successfully reactivated Account in app.";
pub const MESSAGE_DELETED: &str = "Successfully deleted Account from app.";

pub struct AccountService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
}

impl AccountService {
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

    /// 导入远端已存在的账户
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn import(&self, request: ImportAccountRequest) -> Result<Committed<Account>> {
        request.validate()?;
        let account = Account::new(&request.email, request.is_service_account);

        if self.store.account_by_email(&account.email).await?.is_some() {
            return Err(AppError::field("email", MESSAGE_ALREADY_EXISTS));
        }

        if self.api.check_account(&account.email).await? == AccountLookup::NotFound {
            warn!("Account does not exist on AnVIL");
            return Err(AppError::inconsistent(MESSAGE_DOES_NOT_EXIST));
        }

        self.audit_service
            .commit(
                Change::InsertAccount(account.clone()).into(),
                AuditAction::AccountImport,
            )
            .await?;

        info!(account_id = %account.id, "Account imported");
        Ok(Committed::new(MESSAGE_IMPORTED, account))
    }

    /// 停用账户：逐个从远端组中移除，全部成功后再更新本地状态
    ///
    /// 本地的组成员记录保留，重新启用时据此恢复。已停用的账户直接返回，不做任何调用。
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: Uuid) -> Result<Committed<Account>> {
        let account = self.get(id).await?;
        if account.status == AccountStatus::Inactive {
            info!(account_id = %account.id, "Account already inactive; nothing to do");
            return Ok(Committed::new(MESSAGE_ALREADY_INACTIVE, account));
        }

        self.sync_memberships(&account, SyncAction::Removing).await?;

        let after = Account {
            status: AccountStatus::Inactive,
            deactivate_date: Some(Utc::now()),
            updated_at: Utc::now(),
            ..account.clone()
        };
        self.audit_service
            .commit(
                Change::UpdateAccount {
                    before: account,
                    after: after.clone(),
                }
                .into(),
                AuditAction::AccountDeactivate,
            )
            .await?;

        info!(account_id = %after.id, "Account deactivated");
        Ok(Committed::new(MESSAGE_DEACTIVATED, after))
    }

    /// 重新启用账户：按本地记录把账户加回所有组
    #[instrument(skip(self))]
    pub async fn reactivate(&self, id: Uuid) -> Result<Committed<Account>> {
        let account = self.get(id).await?;
        if account.status == AccountStatus::Active {
            info!(account_id = %account.id, "Account already active; nothing to do");
            return Ok(Committed::new(MESSAGE_ALREADY_ACTIVE, account));
        }

        self.sync_memberships(&account, SyncAction::Adding).await?;

        let after = Account {
            status: AccountStatus::Active,
            updated_at: Utc::now(),
            ..account.clone()
        };
        self.audit_service
            .commit(
                Change::UpdateAccount {
                    before: account,
                    after: after.clone(),
                }
                .into(),
                AuditAction::AccountReactivate,
            )
            .await?;

        info!(account_id = %after.id, "Account reactivated");
        Ok(Committed::new(MESSAGE_REACTIVATED, after))
    }

    /// 删除账户：活跃账户先从远端组中移除，再删除本地成员记录和账户
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Committed<Account>> {
        let account = self.get(id).await?;

        // 停用账户在远端已不在任何组中
        if account.is_active() {
            self.sync_memberships(&account, SyncAction::Removing).await?;
        }

        let mut changes = ChangeSet::new();
        for membership in self
            .store
            .group_account_memberships_for_account(account.id)
            .await?
        {
            changes.push(Change::DeleteGroupAccountMembership(membership));
        }
        changes.push(Change::DeleteAccount(account.clone()));
        self.audit_service
            .commit(changes, AuditAction::AccountDelete)
            .await?;

        info!(account_id = %account.id, "Account deleted");
        Ok(Committed::new(MESSAGE_DELETED, account))
    }

    /// 对账户的每条组成员记录发起一次远端调用，遇到第一个失败即停止
    ///
    /// 已经完成的远端调用不会回滚。
    async fn sync_memberships(&self, account: &Account, action: SyncAction) -> Result<()> {
        let memberships = self
            .store
            .group_account_memberships_for_account(account.id)
            .await?;

        for membership in memberships {
            let group = self.group_of(&membership).await?;
            let result = match action {
                SyncAction::Removing => {
                    self.api
                        .remove_member(&group.name, membership.role, &account.email)
                        .await
                }
                SyncAction::Adding => {
                    self.api
                        .add_member(&group.name, membership.role, &account.email)
                        .await
                }
            };

            if let Err(e) = result {
                error!(
                    account_id = %account.id,
                    group = %group.name,
                    action = ?action,
                    error = %e,
                    "Failed to sync account membership; remote groups may be partially updated"
                );
                return Err(AppError::MembershipSync {
                    action,
                    group: group.name,
                    error: e,
                });
            }
        }

        Ok(())
    }

    async fn group_of(&self, membership: &GroupAccountMembership) -> Result<ManagedGroup> {
        self.store
            .managed_group_by_id(membership.group_id)
            .await?
            .ok_or_else(|| {
                AppError::internal_error(&format!("managed group {} missing", membership.group_id))
            })
    }

    pub async fn get(&self, id: Uuid) -> Result<Account> {
        self.store
            .account_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("account {}", id)))
    }

    pub async fn list(&self) -> Result<Vec<Account>> {
        self.store.list_accounts().await
    }
}
