//! 托管组的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{committed, created};
use crate::{
    error::AppError, middleware::AppState, models::managed_group::ManagedGroupRequest,
};

pub async fn list_managed_groups(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let groups = state.managed_group_service.list().await?;
    Ok(Json(json!({
        "managed_groups": groups,
        "count": groups.len(),
    })))
}

/// 在 AnVIL 上创建组
pub async fn create_managed_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManagedGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.managed_group_service.create(req).await?;
    Ok(created("managed_group", result))
}

/// 导入已有的组
pub async fn import_managed_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManagedGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.managed_group_service.import(req).await?;
    Ok(created("managed_group", result))
}

pub async fn get_managed_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let group = state.managed_group_service.get(&name).await?;
    let email = group.email(state.api.group_email_domain());
    Ok(Json(json!({
        "managed_group": group,
        "email": email,
    })))
}

pub async fn delete_managed_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.managed_group_service.delete(&name).await?;
    Ok(committed("managed_group", result))
}
