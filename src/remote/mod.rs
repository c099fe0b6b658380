//! 远端平台网关
//! AnVIL/Terra REST API 的类型化封装，所有远端调用都经过 [`AnvilApi`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MembershipRole;

pub mod client;

pub use client::AnvilClient;

/// 远端调用失败：HTTP 状态码与远端返回的消息
///
/// 传输层失败（连接、超时）时 status 为 0。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub status: u16,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// 远端账户查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLookup {
    Found,
    NotFound,
}

/// 当前服务账户所在的远端组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGroup {
    #[serde(rename = "groupName")]
    pub group_name: String,
    #[serde(rename = "groupEmail", default)]
    pub group_email: String,
    /// "Admin" 或 "Member"
    pub role: String,
}

impl RemoteGroup {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// 远端工作区的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWorkspace {
    pub namespace: String,
    pub name: String,
    /// "OWNER"、"PROJECT_OWNER"、"WRITER"、"READER" 或 "NO ACCESS"
    pub access_level: String,
    pub authorization_domains: Vec<String>,
}

impl RemoteWorkspace {
    pub fn is_owner(&self) -> bool {
        self.access_level == "OWNER"
    }
}

/// ACL 中的一条记录，用于 PATCH 请求和响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclEntry {
    pub email: String,
    #[serde(default)]
    pub access_level: String,
    #[serde(default)]
    pub can_share: bool,
    #[serde(default)]
    pub can_compute: bool,
}

/// ACL PATCH 的响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclPatchResponse {
    #[serde(default)]
    pub users_updated: Vec<AclEntry>,
    #[serde(default)]
    pub users_not_found: Vec<AclEntry>,
    #[serde(default)]
    pub invites_sent: Vec<AclEntry>,
}

impl AclPatchResponse {
    pub fn updated(&self, email: &str) -> bool {
        contains_email(&self.users_updated, email)
    }

    pub fn not_found(&self, email: &str) -> bool {
        contains_email(&self.users_not_found, email)
    }
}

fn contains_email(entries: &[AclEntry], email: &str) -> bool {
    entries.iter().any(|e| e.email.eq_ignore_ascii_case(email))
}

/// 远端平台 API
///
/// 每个方法对应一个远端接口。除特别说明外，非预期状态码一律返回 [`RemoteError`]。
#[async_trait]
pub trait AnvilApi: Send + Sync {
    /// 托管组邮箱后缀
    fn group_email_domain(&self) -> &str;

    async fn status(&self) -> RemoteResult<serde_json::Value>;

    /// 当前服务账户信息
    async fn me(&self) -> RemoteResult<serde_json::Value>;

    async fn create_group(&self, group_name: &str) -> RemoteResult<()>;

    async fn delete_group(&self, group_name: &str) -> RemoteResult<()>;

    /// 404 视为不存在，而不是错误
    async fn group_exists(&self, group_name: &str) -> RemoteResult<bool>;

    async fn list_my_groups(&self) -> RemoteResult<Vec<RemoteGroup>>;

    async fn add_member(
        &self,
        group_name: &str,
        role: MembershipRole,
        email: &str,
    ) -> RemoteResult<()>;

    async fn remove_member(
        &self,
        group_name: &str,
        role: MembershipRole,
        email: &str,
    ) -> RemoteResult<()>;

    /// 服务账户是否为该计费项目的用户；404 视为否
    async fn check_billing_project(&self, name: &str) -> RemoteResult<bool>;

    async fn check_account(&self, email: &str) -> RemoteResult<AccountLookup>;

    async fn create_workspace(
        &self,
        namespace: &str,
        name: &str,
        authorization_domains: &[String],
    ) -> RemoteResult<()>;

    async fn clone_workspace(
        &self,
        source_namespace: &str,
        source_name: &str,
        namespace: &str,
        name: &str,
        authorization_domains: &[String],
    ) -> RemoteResult<()>;

    async fn delete_workspace(&self, namespace: &str, name: &str) -> RemoteResult<()>;

    async fn list_workspaces(&self) -> RemoteResult<Vec<RemoteWorkspace>>;

    async fn get_workspace(&self, namespace: &str, name: &str) -> RemoteResult<RemoteWorkspace>;

    async fn patch_acl(
        &self,
        namespace: &str,
        name: &str,
        entries: &[AclEntry],
    ) -> RemoteResult<AclPatchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_response_email_match_is_case_insensitive() {
        let response: AclPatchResponse = serde_json::from_value(serde_json::json!({
            "usersUpdated": [{"email": "Group@firecloud.org", "accessLevel": "READER"}],
            "usersNotFound": [],
        }))
        .unwrap();

        assert!(response.updated("group@firecloud.org"));
        assert!(!response.not_found("group@firecloud.org"));
        assert!(response.invites_sent.is_empty());
    }

    #[test]
    fn test_remote_group_role() {
        let group: RemoteGroup = serde_json::from_value(serde_json::json!({
            "groupName": "g", "groupEmail": "g@firecloud.org", "role": "Admin"
        }))
        .unwrap();
        assert!(group.is_admin());
    }
}
