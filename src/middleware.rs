//! 应用状态与 HTTP 中间件

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::config::AppConfig;
use crate::remote::AnvilApi;
use crate::repository::Store;
use crate::services::{
    AccountService, AuditService, BillingProjectService, ConsistencyService, ManagedGroupService,
    MembershipService, WorkspaceAccessService, WorkspaceService,
};

/// 应用状态
///
/// 所有服务共享同一个存储、远端客户端和历史服务。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub api: Arc<dyn AnvilApi>,
    pub adapters: Arc<AdapterRegistry>,
    pub audit_service: Arc<AuditService>,
    pub billing_project_service: Arc<BillingProjectService>,
    pub account_service: Arc<AccountService>,
    pub managed_group_service: Arc<ManagedGroupService>,
    pub membership_service: Arc<MembershipService>,
    pub workspace_service: Arc<WorkspaceService>,
    pub access_service: Arc<WorkspaceAccessService>,
    pub consistency_service: Arc<ConsistencyService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        api: Arc<dyn AnvilApi>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        let audit_service = Arc::new(AuditService::new(store.clone()));

        Self {
            billing_project_service: Arc::new(BillingProjectService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
            )),
            account_service: Arc::new(AccountService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
            )),
            managed_group_service: Arc::new(ManagedGroupService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
            )),
            membership_service: Arc::new(MembershipService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
            )),
            workspace_service: Arc::new(WorkspaceService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
                adapters.clone(),
            )),
            access_service: Arc::new(WorkspaceAccessService::new(
                store.clone(),
                api.clone(),
                audit_service.clone(),
            )),
            consistency_service: Arc::new(ConsistencyService::new(store.clone(), api.clone())),
            audit_service,
            config,
            store,
            api,
            adapters,
        }
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let uri = req.uri().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();
        let mut response = next.run(req).await;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        metrics::counter!(
            "http_requests_total",
            "method" => method_label(&method),
            "status" => status_class(status)
        )
        .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        // trace_id 来自客户端，非法值不回写
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}

fn method_label(method: &axum::http::Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        _ => "OTHER",
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
