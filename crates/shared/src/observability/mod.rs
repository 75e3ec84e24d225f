//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。服务通过单一入口点配置可观测性，
//! 保证日志格式和指标命名一致。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，出现在日志和指标标签中
    pub service_name: String,

    /// Prometheus 指标导出端口，未设置时不启动导出服务
    pub metrics_port: Option<u16>,

    /// 日志级别（如 "info", "debug"），`RUST_LOG` 优先
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "gophermart".to_string(),
            metrics_port: None,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// 可观测性资源守卫
///
/// 持有指标导出服务的生命周期，drop 时记录关闭日志。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 先初始化日志，再按配置安装 Prometheus recorder 并启动导出端点。
///
/// # Example
///
/// ```ignore
/// use gophermart_shared::observability::{init, ObservabilityConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let _guard = init(&ObservabilityConfig::default()).await?;
///     Ok(())
/// }
/// ```
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        metrics_port = ?config.metrics_port,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    let metrics_handle = match config.metrics_port {
        Some(port) => Some(metrics::init(&config.service_name, port).await?),
        None => None,
    };

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "gophermart");
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }
}
