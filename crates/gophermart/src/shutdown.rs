//! 优雅关闭
//!
//! HTTP 服务与对账 Worker 共用一个关闭宽限期。

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// 在同一截止时间内等待全部后台任务结束
///
/// 全部结束返回 `true`；超时返回 `false`，未结束的任务随运行时退出被丢弃。
pub async fn join_all_within(grace: Duration, handles: Vec<JoinHandle<()>>) -> bool {
    let drain = async {
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "后台任务异常退出");
            }
        }
    };

    tokio::time::timeout(grace, drain).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_all_tasks_finish_in_time() {
        let handles = vec![
            tokio::spawn(tokio::time::sleep(Duration::from_secs(1))),
            tokio::spawn(tokio::time::sleep(Duration::from_secs(3))),
        ];

        let start = Instant::now();
        assert!(join_all_within(Duration::from_secs(5), handles).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shared_across_tasks() {
        // 先结束的任务不会重置截止时间
        let handles = vec![
            tokio::spawn(async { tokio::time::sleep(Duration::from_secs(4)).await }),
            tokio::spawn(async { tokio::time::sleep(Duration::from_secs(10)).await }),
        ];

        let start = Instant::now();
        assert!(!join_all_within(Duration::from_secs(5), handles).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_task_does_not_block() {
        let task: JoinHandle<()> = tokio::spawn(async { panic!("boom") });
        assert!(join_all_within(Duration::from_secs(5), vec![task]).await);
    }
}
