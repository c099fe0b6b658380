//! 变更历史查询

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::AppState,
    models::{ChangeType, EntityKind, HistoryFilters},
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub change_type: Option<ChangeType>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// 按实体类型、实体或变更类型过滤，最新的在前
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !(1..=500).contains(&query.limit) || query.offset < 0 {
        return Err(AppError::validation("limit must be 1-500 and offset non-negative"));
    }
    let filters = HistoryFilters {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        change_type: query.change_type,
    };
    let records = state
        .audit_service
        .query_history(&filters, query.limit, query.offset)
        .await?;

    Ok(Json(json!({
        "records": records,
        "count": records.len(),
        "limit": query.limit,
        "offset": query.offset,
    })))
}
