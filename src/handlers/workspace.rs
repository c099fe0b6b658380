//! 工作区的 HTTP 处理器

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{committed, created};
use crate::{
    error::AppError,
    middleware::AppState,
    models::workspace::{CreateWorkspaceRequest, ImportWorkspaceRequest, WorkspaceListFilters},
};

/// 列出工作区，可按类型或计费项目过滤
pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<WorkspaceListFilters>,
) -> Result<impl IntoResponse, AppError> {
    let workspaces = state.workspace_service.list(&filters).await?;
    Ok(Json(json!({
        "workspaces": workspaces,
        "count": workspaces.len(),
    })))
}

pub async fn create_workspace(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.workspace_service.create(req).await?;
    Ok(created("workspace", result))
}

/// 应用是所有者、但尚未导入的远端工作区
pub async fn list_importable_workspaces(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let workspaces = state.workspace_service.importable().await?;
    Ok(Json(json!({ "workspaces": workspaces })))
}

pub async fn import_workspace(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.workspace_service.import(req).await?;
    Ok(created("workspace", result))
}

pub async fn get_workspace(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state.workspace_service.detail(&billing_project, &name).await?,
    ))
}

pub async fn clone_workspace(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name)): Path<(String, String)>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .workspace_service
        .clone_workspace(&billing_project, &name, req)
        .await?;
    Ok(created("workspace", result))
}

pub async fn delete_workspace(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .workspace_service
        .delete(&billing_project, &name)
        .await?;
    Ok(committed("workspace", result))
}

/// 组对工作区的访问情况
pub async fn group_access_summary(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name, group)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.workspace_service;
    let in_auth_domain = service
        .is_in_authorization_domain(&billing_project, &name, &group)
        .await?;
    let is_shared = service.is_shared(&billing_project, &name, &group).await?;
    Ok(Json(json!({
        "group": group,
        "is_in_authorization_domain": in_auth_domain,
        "is_shared": is_shared,
        "has_access": in_auth_domain && is_shared,
    })))
}

/// 已注册的工作区类型
pub async fn list_workspace_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let types: Vec<_> = state
        .adapters
        .all()
        .iter()
        .map(|adapter| {
            json!({
                "workspace_type": adapter.workspace_type(),
                "name": adapter.name(),
                "description": adapter.description(),
                "data_fields": adapter.data_fields(),
                "list_columns": adapter.list_columns(),
            })
        })
        .collect();
    Json(json!({ "workspace_types": types }))
}
