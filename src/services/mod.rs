//! Business logic services layer
//! 每个写操作都遵循：本地校验 -> 远端调用 -> 本地原子提交

use serde::Serialize;

pub mod access_service;
pub mod account_service;
pub mod audit_service;
pub mod billing_project_service;
pub mod consistency_service;
pub mod managed_group_service;
pub mod membership_service;
pub mod workspace_service;

pub use access_service::WorkspaceAccessService;
pub use account_service::AccountService;
pub use audit_service::{AuditAction, AuditService};
pub use billing_project_service::BillingProjectService;
pub use consistency_service::ConsistencyService;
pub use managed_group_service::ManagedGroupService;
pub use membership_service::MembershipService;
pub use workspace_service::WorkspaceService;

/// 成功提交的操作结果与提示消息
#[derive(Debug, Clone, Serialize)]
pub struct Committed<T> {
    pub message: &'static str,
    pub record: T,
}

impl<T> Committed<T> {
    pub fn new(message: &'static str, record: T) -> Self {
        Self { message, record }
    }
}
