//! 工作区共享的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{committed, created};
use crate::{
    error::AppError,
    middleware::AppState,
    models::access::{GrantAccessRequest, UpdateAccessRequest},
};

pub async fn list_access(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let accesses = state
        .access_service
        .list_for_workspace(&billing_project, &name)
        .await?;
    Ok(Json(json!({ "access": accesses })))
}

pub async fn grant_access(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name)): Path<(String, String)>,
    Json(req): Json<GrantAccessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .access_service
        .grant(&billing_project, &name, req)
        .await?;
    Ok(created("access", result))
}

pub async fn update_access(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name, group)): Path<(String, String, String)>,
    Json(req): Json<UpdateAccessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .access_service
        .update(&billing_project, &name, &group, req)
        .await?;
    Ok(committed("access", result))
}

pub async fn revoke_access(
    State(state): State<Arc<AppState>>,
    Path((billing_project, name, group)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .access_service
        .revoke(&billing_project, &name, &group)
        .await?;
    Ok(committed("access", result))
}
