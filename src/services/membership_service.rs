//! 组成员关系服务
//! 组嵌套组、账户加入组；父组必须由本应用管理

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{AuditAction, AuditService, Committed};
use crate::error::{AppError, Result};
use crate::models::membership::{
    CreateGroupAccountMembershipRequest, CreateGroupGroupMembershipRequest,
};
use crate::models::{
    Account, GroupAccountMembership, GroupGraph, GroupGroupMembership, ManagedGroup,
    MembershipRole,
};
use crate::remote::AnvilApi;
use crate::repository::{Change, Store};

pub const MESSAGE_CREATED: &str = "Successfully created group membership.";
pub const MESSAGE_DELETED: &str = "Successfully deleted group membership on AnVIL.";
pub const MESSAGE_PARENT_NOT_MANAGED: &str = "Parent group is not managed by this app.";
pub const MESSAGE_GROUP_NOT_MANAGED: &str = "Group is not managed by this app.";
pub const MESSAGE_SAME_GROUP: &str = "Cannot add a group to itself.";
pub const MESSAGE_CIRCULAR: &str = "Cannot add a circular group relationship.";
pub const MESSAGE_GROUP_MEMBERSHIP_EXISTS: &str =
    "Group group membership with this Parent group, Child group and Role already exists.";
pub const MESSAGE_ACCOUNT_MEMBERSHIP_EXISTS: &str =
    "Group account membership with this Group, Account and Role already exists.";
pub const MESSAGE_ACCOUNT_INACTIVE: &str = "Cannot add an inactive account to a group.";

pub struct MembershipService {
    store: Arc<dyn Store>,
    api: Arc<dyn AnvilApi>,
    audit_service: Arc<AuditService>,
}

impl MembershipService {
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

    async fn group(&self, field: &str, name: &str) -> Result<ManagedGroup> {
        self.store
            .managed_group_by_name(name)
            .await?
            .ok_or_else(|| AppError::field(field, &format!("Managed group {} does not exist.", name)))
    }

    async fn account(&self, email: &str) -> Result<Account> {
        self.store
            .account_by_email(email)
            .await?
            .ok_or_else(|| {
                AppError::field("account_email", &format!("Account {} does not exist.", email))
            })
    }

    /// 把子组加入父组
    #[instrument(skip(self, request), fields(parent = %request.parent_group, child = %request.child_group))]
    pub async fn add_group_to_group(
        &self,
        request: CreateGroupGroupMembershipRequest,
    ) -> Result<Committed<GroupGroupMembership>> {
        request.validate()?;
        let parent = self.group("parent_group", &request.parent_group).await?;
        let child = self.group("child_group", &request.child_group).await?;

        if !parent.is_managed_by_app {
            return Err(AppError::blocked(MESSAGE_PARENT_NOT_MANAGED));
        }
        if parent.id == child.id {
            return Err(AppError::field("child_group", MESSAGE_SAME_GROUP));
        }

        let edges = self.store.group_group_memberships().await?;
        if edges.iter().any(|m| {
            m.parent_group_id == parent.id && m.child_group_id == child.id && m.role == request.role
        }) {
            return Err(AppError::validation(MESSAGE_GROUP_MEMBERSHIP_EXISTS));
        }
        if GroupGraph::from_edges(&edges).would_create_cycle(parent.id, child.id) {
            return Err(AppError::field("child_group", MESSAGE_CIRCULAR));
        }

        let child_email = child.email(self.api.group_email_domain());
        self.api
            .add_member(&parent.name, request.role, &child_email)
            .await?;

        let membership = GroupGroupMembership::new(parent.id, child.id, request.role);
        self.audit_service
            .commit(
                Change::InsertGroupGroupMembership(membership.clone()).into(),
                AuditAction::GroupGroupMembershipCreate,
            )
            .await?;

        info!(membership_id = %membership.id, role = %membership.role, "Group added to group");
        Ok(Committed::new(MESSAGE_CREATED, membership))
    }

    #[instrument(skip(self))]
    pub async fn remove_group_from_group(
        &self,
        parent_group: &str,
        child_group: &str,
        role: MembershipRole,
    ) -> Result<Committed<GroupGroupMembership>> {
        let parent = self.group("parent_group", parent_group).await?;
        let child = self.group("child_group", child_group).await?;
        let membership = self
            .store
            .group_group_memberships()
            .await?
            .into_iter()
            .find(|m| {
                m.parent_group_id == parent.id && m.child_group_id == child.id && m.role == role
            })
            .ok_or_else(|| {
                AppError::not_found(&format!(
                    "{} membership of {} in {}",
                    role, child.name, parent.name
                ))
            })?;

        if !parent.is_managed_by_app {
            return Err(AppError::blocked(MESSAGE_PARENT_NOT_MANAGED));
        }

        let child_email = child.email(self.api.group_email_domain());
        self.api
            .remove_member(&parent.name, role, &child_email)
            .await?;

        self.audit_service
            .commit(
                Change::DeleteGroupGroupMembership(membership.clone()).into(),
                AuditAction::GroupGroupMembershipDelete,
            )
            .await?;

        info!(membership_id = %membership.id, "Group removed from group");
        Ok(Committed::new(MESSAGE_DELETED, membership))
    }

    /// 把活跃账户加入组
    #[instrument(skip(self, request), fields(group = %request.group, account = %request.account_email))]
    pub async fn add_account_to_group(
        &self,
        request: CreateGroupAccountMembershipRequest,
    ) -> Result<Committed<GroupAccountMembership>> {
        request.validate()?;
        let group = self.group("group", &request.group).await?;
        let account = self.account(&request.account_email).await?;

        if !group.is_managed_by_app {
            return Err(AppError::blocked(MESSAGE_GROUP_NOT_MANAGED));
        }
        if !account.is_active() {
            return Err(AppError::field("account_email", MESSAGE_ACCOUNT_INACTIVE));
        }
        if self
            .store
            .group_account_memberships_for_group(group.id)
            .await?
            .iter()
            .any(|m| m.account_id == account.id && m.role == request.role)
        {
            return Err(AppError::validation(MESSAGE_ACCOUNT_MEMBERSHIP_EXISTS));
        }

        self.api
            .add_member(&group.name, request.role, &account.email)
            .await?;

        let membership = GroupAccountMembership::new(group.id, account.id, request.role);
        self.audit_service
            .commit(
                Change::InsertGroupAccountMembership(membership.clone()).into(),
                AuditAction::GroupAccountMembershipCreate,
            )
            .await?;

        info!(membership_id = %membership.id, role = %membership.role, "Account added to group");
        Ok(Committed::new(MESSAGE_CREATED, membership))
    }

    #[instrument(skip(self))]
    pub async fn remove_account_from_group(
        &self,
        group_name: &str,
        account_id: Uuid,
        role: MembershipRole,
    ) -> Result<Committed<GroupAccountMembership>> {
        let group = self.group("group", group_name).await?;
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("account {}", account_id)))?;
        let membership = self
            .store
            .group_account_memberships_for_group(group.id)
            .await?
            .into_iter()
            .find(|m| m.account_id == account.id && m.role == role)
            .ok_or_else(|| {
                AppError::not_found(&format!(
                    "{} membership of {} in {}",
                    role, account.email, group.name
                ))
            })?;

        if !group.is_managed_by_app {
            return Err(AppError::blocked(MESSAGE_GROUP_NOT_MANAGED));
        }

        self.api
            .remove_member(&group.name, role, &account.email)
            .await?;

        self.audit_service
            .commit(
                Change::DeleteGroupAccountMembership(membership.clone()).into(),
                AuditAction::GroupAccountMembershipDelete,
            )
            .await?;

        info!(membership_id = %membership.id, "Account removed from group");
        Ok(Committed::new(MESSAGE_DELETED, membership))
    }

    /// 组的直接成员：子组与账户
    pub async fn members(
        &self,
        group_name: &str,
    ) -> Result<(Vec<GroupGroupMembership>, Vec<GroupAccountMembership>)> {
        let group = self
            .store
            .managed_group_by_name(group_name)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("managed group {}", group_name)))?;
        let groups = self
            .store
            .group_group_memberships()
            .await?
            .into_iter()
            .filter(|m| m.parent_group_id == group.id)
            .collect();
        let accounts = self
            .store
            .group_account_memberships_for_group(group.id)
            .await?;
        Ok((groups, accounts))
    }
}
