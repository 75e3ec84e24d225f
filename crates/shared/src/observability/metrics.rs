//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。未安装 recorder 时
//! 所有记录函数都是空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 安装 Prometheus recorder 并在指定端口暴露 `/metrics`
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 `/metrics` 的 HELP 注释中
fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "accrual_queries_total",
        "Accrual system queries by outcome"
    );
    metrics::describe_counter!("reconcile_ticks_total", "Reconciler ticks executed");
    metrics::describe_counter!(
        "orders_finalized_total",
        "Orders that reached a terminal status"
    );
    metrics::describe_counter!("withdrawals_total", "Withdrawals by outcome");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次积分系统查询，outcome 取值 ok / not_found / rate_limited / unavailable
#[inline]
pub fn record_accrual_query(outcome: &'static str) {
    metrics::counter!("accrual_queries_total", "outcome" => outcome).increment(1);
}

/// 记录一次对账轮询
#[inline]
pub fn record_reconcile_tick() {
    metrics::counter!("reconcile_ticks_total").increment(1);
}

/// 记录订单进入终态
#[inline]
pub fn record_order_finalized(status: &'static str) {
    metrics::counter!("orders_finalized_total", "status" => status).increment(1);
}

/// 记录提现结果
#[inline]
pub fn record_withdrawal(outcome: &'static str) {
    metrics::counter!("withdrawals_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/user/orders", 200, 0.1);
        record_accrual_query("ok");
        record_reconcile_tick();
        record_order_finalized("PROCESSED");
        record_withdrawal("success");
    }
}
