//! 健康检查与远端状态

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use once_cell::sync::OnceCell;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::{error::AppError, middleware::AppState};

static START_TIME: OnceCell<Instant> = OnceCell::new();

pub fn set_start_time() {
    let _ = START_TIME.set(Instant::now());
}

pub fn get_uptime() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// 存活探针
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": get_uptime(),
    }))
}

/// 就绪探针：本地存储可用且远端可达
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Entity store not ready");
            e.user_message()
        }
    };
    let remote = match state.api.status().await {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "AnVIL API not reachable");
            e.message
        }
    };

    let ready = store == "ok" && remote == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": ready,
            "checks": { "store": store, "remote": remote },
        })),
    )
}

/// 远端平台状态与服务账户信息
pub async fn remote_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.api.status().await?;
    let me = state.api.me().await?;
    Ok(Json(json!({ "status": status, "me": me })))
}
