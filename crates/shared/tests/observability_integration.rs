//! 可观测性模块集成测试
//!
//! 未安装 recorder 时所有指标记录都应是无副作用的空操作。

mod metrics_tests {
    use gophermart_shared::observability::metrics::{
        get_handle, record_accrual_query, record_http_request, record_order_finalized,
        record_reconcile_tick, record_withdrawal,
    };

    #[test]
    fn test_record_without_recorder() {
        assert!(get_handle().is_none());

        record_http_request("POST", "/api/user/orders", 202, 0.01);
        record_http_request("GET", "unmatched", 404, 0.0);
        record_accrual_query("ok");
        record_accrual_query("rate_limited");
        record_reconcile_tick();
        record_order_finalized("PROCESSED");
        record_withdrawal("insufficient_funds");
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        // 超长路径
        let long_path = "/api/".to_string() + &"x".repeat(1000);
        record_http_request("GET", &long_path, 200, 0.01);

        // 极端持续时间
        record_http_request("GET", "/api/slow", 200, 999.99);
    }
}

mod config_tests {
    use gophermart_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "gophermart");
        assert_eq!(config.log_level, "info");
        assert!(config.metrics_port.is_none());
        assert!(!config.json_logs);
    }

    #[tokio::test]
    async fn test_init_without_metrics_port() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        assert!(gophermart_shared::observability::init(&config).await.is_ok());
    }
}
