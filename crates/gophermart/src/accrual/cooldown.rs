//! 进程级限流冷却
//!
//! 记录"下一次允许调用积分系统的最早时刻"。多次设置只保留最晚的时刻。

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct Cooldown {
    until: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将冷却延长到 `now + delay`，返回生效的截止时刻
    pub fn extend(&self, delay: Duration) -> Instant {
        self.extend_until(Instant::now() + delay)
    }

    /// 将冷却延长到 `deadline`，已有更晚的截止时刻时保持不变
    pub fn extend_until(&self, deadline: Instant) -> Instant {
        let mut until = self.until.lock();
        let effective = match *until {
            Some(existing) if existing >= deadline => existing,
            _ => deadline,
        };
        *until = Some(effective);
        effective
    }

    /// 冷却剩余时间，未处于冷却时返回 `None`
    pub fn remaining(&self) -> Option<Duration> {
        let until = (*self.until.lock())?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    pub fn is_active(&self) -> bool {
        self.remaining().is_some()
    }

    /// 睡眠直到冷却结束，期间被延长会继续等待
    pub async fn wait(&self) {
        while let Some(remaining) = self.remaining() {
            tokio::time::sleep(remaining).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_extend_keeps_latest_deadline() {
        let cooldown = Cooldown::new();
        assert!(!cooldown.is_active());

        let first = cooldown.extend(Duration::from_secs(5));
        let second = cooldown.extend(Duration::from_secs(2));
        assert_eq!(first, second);
        assert_eq!(cooldown.remaining(), Some(Duration::from_secs(5)));

        let third = cooldown.extend(Duration::from_secs(10));
        assert!(third > first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_deadline() {
        let cooldown = Cooldown::new();
        cooldown.extend(Duration::from_secs(2));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(cooldown.is_active());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!cooldown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_follows_extension() {
        let cooldown = std::sync::Arc::new(Cooldown::new());
        cooldown.extend(Duration::from_secs(1));

        let start = Instant::now();
        let waiter = {
            let cooldown = cooldown.clone();
            tokio::spawn(async move { cooldown.wait().await })
        };

        // 等待期间延长冷却
        tokio::time::sleep(Duration::from_millis(500)).await;
        cooldown.extend(Duration::from_secs(2));

        waiter.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2500));
    }
}
