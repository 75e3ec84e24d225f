//! 重试策略与执行器
//!
//! 提供指数退避重试机制，用于启动阶段数据库尚未就绪等瞬时故障的自动恢复。
//! 是否可重试由调用方通过 `is_retryable` 闭包决定。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::SharedError;

/// 重试策略配置
///
/// 指数退避：首次失败等 `initial_delay`，之后每次乘以 `multiplier`，不超过 `max_delay`。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// 默认策略：最多重试 3 次，初始等待 1 秒，最大等待 30 秒，倍数 2.0
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 启动阶段连接数据库使用的策略
    ///
    /// 总等待约 1+2+4+8+8 = 23 秒，足够覆盖 PostgreSQL 容器冷启动。
    pub fn startup() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }

    /// 计算第 N 次重试的等待时间（attempt 从 0 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 已失败 `attempt` 次后是否还应继续重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// 带重试的异步执行器
///
/// 仅在 `is_retryable` 返回 true 时退避重试，其余错误直接向上传播。
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&SharedError) -> bool,
    mut operation: F,
) -> Result<T, SharedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SharedError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!(operation = operation_name, error = %err, "操作失败且不可重试");
            return Err(err);
        }

        if !policy.should_retry(attempt) {
            warn!(
                operation = operation_name,
                attempt,
                max_retries = policy.max_retries,
                error = %err,
                "已达最大重试次数，放弃重试"
            );
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "操作失败，将在退避后重试"
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::startup();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        // 受限于 max_delay
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(8));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_policy(
            &fast_policy(3),
            "connect",
            SharedError::is_retryable,
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SharedError::Database(sqlx::Error::PoolTimedOut))
                    } else {
                        Ok(7)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_policy(
            &fast_policy(2),
            "connect",
            SharedError::is_retryable,
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SharedError::Database(sqlx::Error::PoolClosed))
                }
            },
        )
        .await;

        assert!(result.is_err());
        // 首次执行 + 2 次重试
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_with_policy(
            &fast_policy(5),
            "connect",
            SharedError::is_retryable,
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SharedError::MissingConfig("database_uri"))
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().code(), "MISSING_CONFIG");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
