//! 计费项目的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{committed, created};
use crate::{
    error::AppError, middleware::AppState, models::billing_project::ImportBillingProjectRequest,
};

pub async fn list_billing_projects(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let billing_projects = state.billing_project_service.list().await?;
    Ok(Json(json!({
        "billing_projects": billing_projects,
        "count": billing_projects.len(),
    })))
}

/// 导入计费项目
pub async fn import_billing_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportBillingProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.billing_project_service.import(req).await?;
    Ok(created("billing_project", result))
}

pub async fn get_billing_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.billing_project_service.get(&name).await?))
}

/// 重新检查应用是否为计费项目的用户
pub async fn refresh_billing_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.billing_project_service.refresh(&name).await?;
    Ok(committed("billing_project", result))
}

pub async fn delete_billing_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.billing_project_service.delete(&name).await?;
    Ok(committed("billing_project", result))
}
