//! 账户的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{committed, created};
use crate::{error::AppError, middleware::AppState, models::account::ImportAccountRequest};

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.account_service.list().await?;
    Ok(Json(json!({
        "accounts": accounts,
        "count": accounts.len(),
    })))
}

/// 导入账户
pub async fn import_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.account_service.import(req).await?;
    Ok(created("account", result))
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.account_service.get(id).await?))
}

pub async fn deactivate_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.account_service.deactivate(id).await?;
    Ok(committed("account", result))
}

pub async fn reactivate_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.account_service.reactivate(id).await?;
    Ok(committed("account", result))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.account_service.delete(id).await?;
    Ok(committed("account", result))
}
