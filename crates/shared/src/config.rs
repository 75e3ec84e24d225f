//! 配置管理模块
//!
//! 支持命令行参数与环境变量两种来源，以及类型安全的配置访问。
//!
//! 优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 命令行参数（`-a`、`-d`、`-r` 等）
//! 3. 环境变量（`RUN_ADDRESS`、`DATABASE_URI`、`ACCRUAL_SYSTEM_ADDRESS` 等）

use std::collections::HashMap;

use clap::Parser;
use config::Config;
use serde::Deserialize;

use crate::error::{Result, SharedError};
use crate::observability::ObservabilityConfig;

/// 默认监听地址
pub const DEFAULT_RUN_ADDRESS: &str = ":8080";

/// 环境变量到配置键的映射
///
/// 只读取这里列出的变量，避免无关的进程环境污染配置树。
pub const ENV_BINDINGS: &[(&str, &str)] = &[
    ("RUN_ADDRESS", "run_address"),
    ("DATABASE_URI", "database_uri"),
    ("ACCRUAL_SYSTEM_ADDRESS", "accrual_system_address"),
    ("JWT_SECRET", "jwt.secret"),
    ("JWT_TTL_SECS", "jwt.ttl_secs"),
    ("RECONCILE_INTERVAL_SECS", "reconciler.interval_secs"),
    ("RECONCILE_CONCURRENCY", "reconciler.concurrency"),
    ("RECONCILE_BATCH_SIZE", "reconciler.batch_size"),
    ("ACCRUAL_TIMEOUT_SECS", "reconciler.scorer_timeout_secs"),
    ("LOG_LEVEL", "observability.log_level"),
    ("JSON_LOGS", "observability.json_logs"),
    ("METRICS_PORT", "observability.metrics_port"),
];

/// 命令行参数
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "gophermart", version, about = "Gophermart loyalty points server")]
pub struct Cli {
    /// HTTP 监听地址，如 `:8080` 或 `127.0.0.1:8080`
    #[arg(short = 'a', long = "address")]
    pub run_address: Option<String>,

    /// PostgreSQL 连接串
    #[arg(short = 'd', long = "database-uri")]
    pub database_uri: Option<String>,

    /// 积分计算系统地址
    #[arg(short = 'r', long = "accrual-address")]
    pub accrual_system_address: Option<String>,

    /// JWT 签名密钥
    #[arg(short = 'k', long = "jwt-secret")]
    pub jwt_secret: Option<String>,

    /// 对账轮询间隔（秒）
    #[arg(long)]
    pub reconcile_interval_secs: Option<u64>,

    /// 并发查询积分系统的上限
    #[arg(long)]
    pub reconcile_concurrency: Option<usize>,

    /// 每轮拉取的订单数
    #[arg(long)]
    pub reconcile_batch_size: Option<i64>,
}

/// 数据库连接池配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 单条语句超时（毫秒），0 表示不限制
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            statement_timeout_ms: 10_000,
        }
    }
}

/// JWT 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub ttl_secs: i64,
    pub issuer: String,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "gophermart-secret-key-change-in-production".to_string(),
            ttl_secs: 86400, // 24 小时
            issuer: "gophermart".to_string(),
        }
    }
}

/// 对账 Worker 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub interval_secs: u64,
    pub concurrency: usize,
    pub batch_size: i64,
    pub scorer_timeout_secs: u64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            concurrency: 4,
            batch_size: 100,
            scorer_timeout_secs: 10,
        }
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 单个请求的处理时限，超时后 handler future 被丢弃，下游调用随之取消
    pub request_timeout_secs: u64,
    /// 收到关闭信号后等待在途任务的最长时间
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            shutdown_grace_secs: 5,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub run_address: String,
    pub database_uri: Option<String>,
    pub accrual_system_address: Option<String>,
    pub jwt: JwtSettings,
    pub reconciler: ReconcilerSettings,
    pub database: DatabaseConfig,
    pub server: ServerSettings,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run_address: DEFAULT_RUN_ADDRESS.to_string(),
            database_uri: None,
            accrual_system_address: None,
            jwt: JwtSettings::default(),
            reconciler: ReconcilerSettings::default(),
            database: DatabaseConfig::default(),
            server: ServerSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从命令行参数和进程环境变量加载配置
    ///
    /// 存在 `.env` 文件时先加载到进程环境（开发环境）。
    pub fn load(cli: &Cli) -> Result<Self> {
        dotenvy::dotenv().ok();
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(cli, &env)
    }

    /// 从给定的参数与环境变量表构建配置
    ///
    /// 环境变量覆盖命令行参数，命令行参数覆盖默认值。
    pub fn from_sources(cli: &Cli, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        let flags: [(&str, Option<String>); 7] = [
            ("run_address", cli.run_address.clone()),
            ("database_uri", cli.database_uri.clone()),
            ("accrual_system_address", cli.accrual_system_address.clone()),
            ("jwt.secret", cli.jwt_secret.clone()),
            (
                "reconciler.interval_secs",
                cli.reconcile_interval_secs.map(|v| v.to_string()),
            ),
            (
                "reconciler.concurrency",
                cli.reconcile_concurrency.map(|v| v.to_string()),
            ),
            (
                "reconciler.batch_size",
                cli.reconcile_batch_size.map(|v| v.to_string()),
            ),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                builder = builder.set_override(key, value)?;
            }
        }

        for (var, key) in ENV_BINDINGS {
            if let Some(value) = env.get(*var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value.clone())?;
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database_uri.as_deref().is_none_or(str::is_empty) {
            return Err(SharedError::MissingConfig("database_uri (-d / DATABASE_URI)"));
        }
        if self.reconciler.concurrency == 0 {
            return Err(SharedError::Internal(
                "reconciler.concurrency 必须大于 0".to_string(),
            ));
        }
        if self.reconciler.batch_size <= 0 {
            return Err(SharedError::Internal(
                "reconciler.batch_size 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 数据库连接串（已通过校验，必定存在）
    pub fn database_uri(&self) -> &str {
        self.database_uri.as_deref().unwrap_or_default()
    }

    /// 获取可直接绑定的监听地址
    ///
    /// `:8080` 这种只有端口的写法绑定到所有网卡。
    pub fn listen_addr(&self) -> String {
        let addr = self.run_address.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{}", addr)
        } else {
            addr.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn cli_with_db() -> Cli {
        Cli {
            database_uri: Some("postgres://flag/db".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_sources(&cli_with_db(), &HashMap::new()).unwrap();
        assert_eq!(config.run_address, ":8080");
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert_eq!(config.reconciler.interval_secs, 5);
        assert_eq!(config.reconciler.concurrency, 4);
        assert_eq!(config.reconciler.batch_size, 100);
        assert_eq!(config.jwt.ttl_secs, 86400);
        assert_eq!(config.server.shutdown_grace_secs, 5);
        assert!(config.accrual_system_address.is_none());
    }

    #[test]
    fn test_database_uri_required() {
        let err = AppConfig::from_sources(&Cli::default(), &HashMap::new()).unwrap_err();
        assert_eq!(err.code(), "MISSING_CONFIG");
    }

    #[test]
    fn test_flags_applied() {
        let cli = Cli {
            run_address: Some("127.0.0.1:9000".to_string()),
            accrual_system_address: Some("localhost:8081".to_string()),
            reconcile_concurrency: Some(8),
            ..cli_with_db()
        };
        let config = AppConfig::from_sources(&cli, &HashMap::new()).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.database_uri(), "postgres://flag/db");
        assert_eq!(
            config.accrual_system_address.as_deref(),
            Some("localhost:8081")
        );
        assert_eq!(config.reconciler.concurrency, 8);
    }

    #[test]
    fn test_env_overrides_flags() {
        let cli = Cli {
            run_address: Some(":9000".to_string()),
            ..cli_with_db()
        };
        let env = env(&[
            ("RUN_ADDRESS", ":7000"),
            ("DATABASE_URI", "postgres://env/db"),
            ("RECONCILE_INTERVAL_SECS", "1"),
            ("JSON_LOGS", "true"),
        ]);
        let config = AppConfig::from_sources(&cli, &env).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:7000");
        assert_eq!(config.database_uri(), "postgres://env/db");
        assert_eq!(config.reconciler.interval_secs, 1);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_unrelated_env_ignored() {
        let env = env(&[("PATH", "/usr/bin"), ("HOME", "/root")]);
        let config = AppConfig::from_sources(&cli_with_db(), &env).unwrap();
        assert_eq!(config.run_address, ":8080");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let env = env(&[("RECONCILE_CONCURRENCY", "0")]);
        assert!(AppConfig::from_sources(&cli_with_db(), &env).is_err());
    }

    #[test]
    fn test_cli_parses_short_flags() {
        let cli = Cli::parse_from([
            "gophermart",
            "-a",
            ":8081",
            "-d",
            "postgres://x",
            "-r",
            "http://accrual:8080",
        ]);
        assert_eq!(cli.run_address.as_deref(), Some(":8081"));
        assert_eq!(cli.database_uri.as_deref(), Some("postgres://x"));
        assert_eq!(
            cli.accrual_system_address.as_deref(),
            Some("http://accrual:8080")
        );
    }
}
