//! 指标处理器
//! 提供 /metrics 端点

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState};

/// 指标响应
#[derive(Serialize)]
pub struct MetricsResponse {
    pub billing_projects: usize,
    pub accounts: usize,
    pub managed_groups: usize,
    pub workspaces: usize,
    pub workspace_types: usize,
    pub process_uptime_secs: u64,
}

/// 本地镜像的实体数量
pub async fn metrics_export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsResponse>, AppError> {
    Ok(Json(MetricsResponse {
        billing_projects: state.store.list_billing_projects().await?.len(),
        accounts: state.store.list_accounts().await?.len(),
        managed_groups: state.store.list_managed_groups().await?.len(),
        workspaces: state.store.list_workspaces().await?.len(),
        workspace_types: state.adapters.registered_names().len(),
        process_uptime_secs: crate::handlers::health::get_uptime(),
    }))
}
