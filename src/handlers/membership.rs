//! 组成员关系的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{committed, created};
use crate::{
    error::AppError,
    middleware::AppState,
    models::membership::{CreateGroupAccountMembershipRequest, CreateGroupGroupMembershipRequest},
    models::MembershipRole,
};

/// 组的直接成员
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (groups, accounts) = state.membership_service.members(&group).await?;
    Ok(Json(json!({
        "group_memberships": groups,
        "account_memberships": accounts,
    })))
}

pub async fn add_group_to_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupGroupMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.membership_service.add_group_to_group(req).await?;
    Ok(created("group_membership", result))
}

pub async fn remove_group_from_group(
    State(state): State<Arc<AppState>>,
    Path((parent, child, role)): Path<(String, String, MembershipRole)>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership_service
        .remove_group_from_group(&parent, &child, role)
        .await?;
    Ok(committed("group_membership", result))
}

pub async fn add_account_to_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupAccountMembershipRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.membership_service.add_account_to_group(req).await?;
    Ok(created("account_membership", result))
}

pub async fn remove_account_from_group(
    State(state): State<Arc<AppState>>,
    Path((group, account_id, role)): Path<(String, Uuid, MembershipRole)>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .membership_service
        .remove_account_from_group(&group, account_id, role)
        .await?;
    Ok(committed("account_membership", result))
}
