//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{handlers, middleware::AppState};

/// 请求体上限
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 探针与指标
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics::metrics_export));

    let api_routes = Router::new()
        .route("/status", get(handlers::health::remote_status))

        // 计费项目
        .route(
            "/billing-projects",
            get(handlers::billing_project::list_billing_projects)
                .post(handlers::billing_project::import_billing_project),
        )
        .route(
            "/billing-projects/{name}",
            get(handlers::billing_project::get_billing_project)
                .delete(handlers::billing_project::delete_billing_project),
        )
        .route(
            "/billing-projects/{name}/refresh",
            post(handlers::billing_project::refresh_billing_project),
        )

        // 账户
        .route(
            "/accounts",
            get(handlers::account::list_accounts).post(handlers::account::import_account),
        )
        .route(
            "/accounts/{id}",
            get(handlers::account::get_account).delete(handlers::account::delete_account),
        )
        .route("/accounts/{id}/deactivate", post(handlers::account::deactivate_account))
        .route("/accounts/{id}/reactivate", post(handlers::account::reactivate_account))

        // 托管组与成员关系
        .route(
            "/managed-groups",
            get(handlers::managed_group::list_managed_groups)
                .post(handlers::managed_group::create_managed_group),
        )
        .route("/managed-groups/import", post(handlers::managed_group::import_managed_group))
        .route(
            "/managed-groups/{name}",
            get(handlers::managed_group::get_managed_group)
                .delete(handlers::managed_group::delete_managed_group),
        )
        .route("/managed-groups/{name}/members", get(handlers::membership::list_members))
        .route(
            "/managed-groups/{parent}/groups/{child}/{role}",
            delete(handlers::membership::remove_group_from_group),
        )
        .route(
            "/managed-groups/{group}/accounts/{account_id}/{role}",
            delete(handlers::membership::remove_account_from_group),
        )
        .route("/group-memberships", post(handlers::membership::add_group_to_group))
        .route("/account-memberships", post(handlers::membership::add_account_to_group))

        // 工作区
        .route("/workspace-types", get(handlers::workspace::list_workspace_types))
        .route(
            "/workspaces",
            get(handlers::workspace::list_workspaces).post(handlers::workspace::create_workspace),
        )
        .route(
            "/workspaces/importable",
            get(handlers::workspace::list_importable_workspaces),
        )
        .route("/workspaces/import", post(handlers::workspace::import_workspace))
        .route(
            "/workspaces/{billing_project}/{name}",
            get(handlers::workspace::get_workspace).delete(handlers::workspace::delete_workspace),
        )
        .route(
            "/workspaces/{billing_project}/{name}/clone",
            post(handlers::workspace::clone_workspace),
        )
        .route(
            "/workspaces/{billing_project}/{name}/groups/{group}",
            get(handlers::workspace::group_access_summary),
        )

        // 工作区共享
        .route(
            "/workspaces/{billing_project}/{name}/access",
            get(handlers::access::list_access).post(handlers::access::grant_access),
        )
        .route(
            "/workspaces/{billing_project}/{name}/access/{group}",
            axum::routing::put(handlers::access::update_access)
                .delete(handlers::access::revoke_access),
        )

        // 历史与一致性检查
        .route("/history", get(handlers::history::list_history))
        .route("/consistency", get(handlers::consistency::run_consistency_check));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
