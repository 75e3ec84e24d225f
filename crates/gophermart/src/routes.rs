//! 路由配置模块
//!
//! 注册与登录为公开路由，其余 `/api/user/*` 端点经过认证中间件。

use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use gophermart_shared::observability::middleware as obs_middleware;
use tower_http::timeout::TimeoutLayer;

use crate::{handlers, middleware::auth_middleware, state::AppState};

/// 公开路由（无需认证）
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/register", post(handlers::user::register))
        .route("/api/user/login", post(handlers::user::login))
}

/// 需要认证的路由
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/user/orders",
            post(handlers::orders::submit_order).get(handlers::orders::list_orders),
        )
        .route("/api/user/balance", get(handlers::balance::get_balance))
        .route(
            "/api/user/balance/withdraw",
            post(handlers::balance::withdraw),
        )
        .route(
            "/api/user/withdrawals",
            get(handlers::balance::list_withdrawals),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// 请求超时中间件，到期返回 408
fn timeout_layer(request_timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)
}

/// 构建完整的应用路由
///
/// `request_timeout` 到期时丢弃处理器 future，进行中的存储调用随之取消。
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(timeout_layer(request_timeout))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
