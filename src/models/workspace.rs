//! Workspace models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validate_slug, ManagedGroup};

/// 远端工作区的本地镜像，(billing_project, name) 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub billing_project_id: Uuid,
    pub name: String,
    /// 适配器类型标签
    pub workspace_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(billing_project_id: Uuid, name: &str, workspace_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            billing_project_id,
            name: name.to_string(),
            workspace_type: workspace_type.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 工作区的授权域，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceAuthorizationDomain {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub group_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceAuthorizationDomain {
    pub fn new(workspace_id: Uuid, group_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            group_id,
            created_at: Utc::now(),
        }
    }
}

/// 适配器定义的附加数据，每个工作区一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceData {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub workspace_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceData {
    pub fn new(workspace_id: Uuid, workspace_type: &str, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            workspace_type: workspace_type.to_string(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Workspace response with billing project and authorization domains
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceDetail {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub billing_project: String,
    pub authorization_domains: Vec<ManagedGroup>,
    pub data: Option<serde_json::Value>,
}

fn default_workspace_type() -> String {
    crate::adapters::DEFAULT_WORKSPACE_TYPE.to_string()
}

fn empty_data() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Create workspace request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, message = "This field is required."))]
    pub billing_project: String,
    #[validate(
        length(min = 1, max = 64, message = "Ensure this value has at most 64 characters."),
        custom(function = "validate_slug")
    )]
    pub name: String,
    #[serde(default)]
    pub authorization_domains: Vec<String>,
    #[serde(default = "default_workspace_type")]
    pub workspace_type: String,
    #[serde(default = "empty_data")]
    pub data: serde_json::Value,
}

/// Import workspace request
#[derive(Debug, Deserialize, Validate)]
pub struct ImportWorkspaceRequest {
    #[validate(
        length(min = 1, max = 64, message = "Ensure this value has at most 64 characters."),
        custom(function = "validate_slug")
    )]
    pub billing_project: String,
    #[validate(
        length(min = 1, max = 64, message = "Ensure this value has at most 64 characters."),
        custom(function = "validate_slug")
    )]
    pub name: String,
    #[serde(default = "default_workspace_type")]
    pub workspace_type: String,
    #[serde(default = "empty_data")]
    pub data: serde_json::Value,
}

/// Workspace list filters
#[derive(Debug, Default, Deserialize)]
pub struct WorkspaceListFilters {
    pub workspace_type: Option<String>,
    pub billing_project: Option<String>,
}

/// 远端工作区的 "namespace/name" 标识
pub fn workspace_key(billing_project: &str, name: &str) -> String {
    format!("{}/{}", billing_project, name)
}
