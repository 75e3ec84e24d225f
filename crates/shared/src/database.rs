//! 数据库连接管理模块
//!
//! 提供 PostgreSQL 连接池管理，支持启动时重试、迁移和健康检查。

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};
use crate::retry::{RetryPolicy, retry_with_policy};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池
    #[instrument(skip(uri, config))]
    pub async fn connect(uri: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut options = PgConnectOptions::from_str(uri)?;
        if config.statement_timeout_ms > 0 {
            options = options.options([("statement_timeout", config.statement_timeout_ms)]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect_with(options)
            .await?;

        info!("Database connection pool created");

        Ok(Self { pool })
    }

    /// 带退避重试地创建连接池
    ///
    /// 容器编排下数据库往往晚于服务就绪，只对连接层面的瞬时错误重试。
    pub async fn connect_with_retry(
        uri: &str,
        config: &DatabaseConfig,
        policy: &RetryPolicy,
    ) -> Result<Self> {
        retry_with_policy(policy, "database_connect", SharedError::is_retryable, || {
            Self::connect(uri, config)
        })
        .await
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }

    /// 运行迁移
    ///
    /// `migrate!` 宏在编译期解析迁移目录，因此迁移集由服务 crate 传入。
    #[instrument(skip(self, migrator))]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        info!("Running database migrations...");
        migrator.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
