//! 订单积分对账 Worker
//!
//! 单个长期运行的任务按固定间隔轮询未终结的订单（`NEW`、`PROCESSING`），
//! 逐个向积分系统查询状态，并通过 `Store::apply_order_outcome` 原子写入结果。
//!
//! - 每轮按上传时间 FIFO 拉取一页订单，信号量限制同时在途的查询数
//! - 分页游标逐轮前移，迟迟不终结的订单不会挡住后面的订单
//! - 积分系统返回 429 时设置进程级冷却并放弃本轮剩余订单
//! - 冷却期间不发出任何查询，冷却结束后的下一轮继续处理
//! - 关闭信号在订单之间或睡眠期间生效，已发出的查询会等待其结束（受客户端超时约束）

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use gophermart_shared::config::ReconcilerSettings;
use gophermart_shared::observability::metrics;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::accrual::{AccrualScorer, Cooldown, ScorerError};
use crate::error::StoreError;
use crate::models::{Order, OrderStatus, round_money};
use crate::repository::{ApplyOutcome, Store};

/// 对账 Worker 配置
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// 轮询间隔
    pub interval: Duration,
    /// 同时在途的积分查询上限
    pub concurrency: usize,
    /// 每轮拉取的订单数
    pub batch_size: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            concurrency: 4,
            batch_size: 100,
        }
    }
}

impl From<&ReconcilerSettings> for ReconcilerConfig {
    fn from(settings: &ReconcilerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            concurrency: settings.concurrency.max(1),
            batch_size: settings.batch_size.max(1),
        }
    }
}

/// 单个订单的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// 状态已写入
    Updated(OrderStatus),
    /// 积分系统状态与本地一致，无需写入
    Unchanged,
    /// 存储拒绝了该迁移（订单已被其他结果终结）
    Ignored,
    /// 积分系统尚未登记
    NotFound,
    /// 触发限流，本轮中止
    RateLimited,
    /// 积分系统不可用，下一轮重试
    Unavailable,
    /// 写入失败，下一轮重试
    StoreFailed,
    /// 冷却或关闭导致未发出查询
    Skipped,
}

/// 一轮对账的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 本轮拉取的订单数
    pub selected: usize,
    /// 实际发出的积分查询数
    pub queried: usize,
    /// 写入新状态的订单数
    pub updated: usize,
    /// 进入终态、离开待对账集合的订单数
    pub finalized: usize,
    /// 因冷却、限流或关闭而未处理的订单数
    pub skipped: usize,
    /// 本轮是否触发限流
    pub rate_limited: bool,
}

impl TickReport {
    fn record(&mut self, outcome: OrderOutcome) {
        match outcome {
            OrderOutcome::Updated(status) => {
                self.queried += 1;
                self.updated += 1;
                if status.is_terminal() {
                    self.finalized += 1;
                }
            }
            OrderOutcome::RateLimited => {
                self.queried += 1;
                self.rate_limited = true;
            }
            OrderOutcome::Skipped => self.skipped += 1,
            _ => self.queried += 1,
        }
    }
}

/// 单个订单任务共享的上下文
#[derive(Clone)]
struct OrderContext {
    store: Arc<dyn Store>,
    scorer: Arc<dyn AccrualScorer>,
    cooldown: Arc<Cooldown>,
    aborted: Arc<AtomicBool>,
}

impl OrderContext {
    fn should_stop(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.cooldown.is_active()
    }

    /// 查询单个订单并写入结果
    async fn reconcile(&self, order: Order) -> OrderOutcome {
        // 等待信号量期间可能已进入冷却
        if self.should_stop() {
            return OrderOutcome::Skipped;
        }

        let reply = match self.scorer.query(&order.number).await {
            Ok(reply) => {
                metrics::record_accrual_query("ok");
                reply
            }
            Err(ScorerError::NotFound) => {
                metrics::record_accrual_query("not_found");
                debug!(order = %order.number, "积分系统尚未登记该订单");
                return OrderOutcome::NotFound;
            }
            Err(ScorerError::RateLimited { retry_after }) => {
                metrics::record_accrual_query("rate_limited");
                self.aborted.store(true, Ordering::SeqCst);
                self.cooldown.extend(retry_after);
                warn!(order = %order.number, ?retry_after, "积分系统限流，暂停查询");
                return OrderOutcome::RateLimited;
            }
            Err(ScorerError::Unavailable(reason)) => {
                metrics::record_accrual_query("unavailable");
                warn!(order = %order.number, %reason, "积分系统不可用");
                return OrderOutcome::Unavailable;
            }
        };

        let status = reply.status.to_order_status();
        let accrual = match status {
            OrderStatus::Processed => reply.accrual.map(round_money),
            _ => None,
        };

        if status == order.status && (!status.is_terminal() || accrual == order.accrual) {
            return OrderOutcome::Unchanged;
        }

        match self
            .store
            .apply_order_outcome(&order.number, status, accrual, order.user_id)
            .await
        {
            Ok(ApplyOutcome::Applied { credited }) => {
                info!(
                    order = %order.number,
                    from = %order.status,
                    to = %status,
                    %credited,
                    "订单状态已更新"
                );
                if status.is_terminal() {
                    metrics::record_order_finalized(status.as_str());
                }
                OrderOutcome::Updated(status)
            }
            Ok(ApplyOutcome::Ignored { current }) => {
                debug!(order = %order.number, %current, proposed = %status, "订单状态迁移被拒绝");
                OrderOutcome::Ignored
            }
            Err(e) => {
                error!(order = %order.number, error = %e, "写入对账结果失败");
                OrderOutcome::StoreFailed
            }
        }
    }
}

/// 订单积分对账 Worker
pub struct Reconciler {
    store: Arc<dyn Store>,
    scorer: Arc<dyn AccrualScorer>,
    cooldown: Arc<Cooldown>,
    config: ReconcilerConfig,
    /// 下一轮拉取的起始偏移
    cursor: AtomicI64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        scorer: Arc<dyn AccrualScorer>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            cooldown: Arc::new(Cooldown::new()),
            config,
            cursor: AtomicI64::new(0),
        }
    }

    /// 主循环：直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.interval,
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "Reconciler 已启动"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if self.cooldown.is_active() {
                tokio::select! {
                    _ = self.cooldown.wait() => {}
                    _ = shutdown.changed() => break,
                }
            }

            match self.tick(&shutdown).await {
                Ok(report) if report.selected > 0 => debug!(?report, "对账轮次完成"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "拉取待对账订单失败"),
            }
        }

        info!("Reconciler 已停止");
    }

    /// 执行一轮对账
    ///
    /// 从游标处拉取一页待对账订单，返回前会等待本轮派发的所有查询结束。
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<TickReport, StoreError> {
        metrics::record_reconcile_tick();

        let mut offset = self.cursor.load(Ordering::SeqCst);
        let mut orders = self.select_page(offset).await?;
        // 游标越过了队尾，从头开始
        if orders.is_empty() && offset > 0 {
            offset = 0;
            orders = self.select_page(0).await?;
        }

        let mut report = TickReport {
            selected: orders.len(),
            ..Default::default()
        };
        if orders.is_empty() {
            self.cursor.store(0, Ordering::SeqCst);
            return Ok(report);
        }

        let ctx = OrderContext {
            store: self.store.clone(),
            scorer: self.scorer.clone(),
            cooldown: self.cooldown.clone(),
            aborted: Arc::new(AtomicBool::new(false)),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let total = orders.len();

        for (dispatched, order) in orders.into_iter().enumerate() {
            if *shutdown.borrow() || ctx.should_stop() {
                report.skipped += total - dispatched;
                break;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                report.skipped += total - dispatched;
                break;
            };
            // 等待名额期间前一个查询可能触发了限流
            if ctx.should_stop() {
                report.skipped += total - dispatched;
                break;
            }

            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                ctx.reconcile(order).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => error!(error = %e, "对账任务异常退出"),
            }
        }

        let next = next_offset(offset, self.config.batch_size, &report);
        self.cursor.store(next, Ordering::SeqCst);

        Ok(report)
    }

    async fn select_page(&self, offset: i64) -> Result<Vec<Order>, StoreError> {
        self.store
            .select_orders_by_status(&OrderStatus::PENDING, self.config.batch_size, offset)
            .await
    }
}

/// 计算下一轮的起始偏移
///
/// 本轮有订单未处理（限流、冷却或关闭）时重试同一页；不满一页说明已到队尾，
/// 回到队首；否则跳过仍处于待对账状态的订单。
fn next_offset(offset: i64, batch_size: i64, report: &TickReport) -> i64 {
    if report.rate_limited || report.skipped > 0 {
        return offset;
    }

    let selected = report.selected as i64;
    if selected < batch_size {
        0
    } else {
        offset + selected - report.finalized as i64
    }
}
