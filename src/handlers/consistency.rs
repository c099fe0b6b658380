//! 一致性检查

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState};

/// 比对本地记录与 AnVIL 上的状态
pub async fn run_consistency_check(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.consistency_service.run().await?;
    Ok(Json(json!({
        "ok": report.ok(),
        "report": report,
    })))
}
