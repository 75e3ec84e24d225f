//! 存储接口定义
//!
//! 服务层与对账 Worker 只依赖 `Store` trait，生产环境使用 PostgreSQL 实现，
//! 测试使用内存实现或 mock。
//!
//! 调用方通过丢弃 future 取消操作，数据库侧另有语句超时兜底。

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::models::{Balance, Order, OrderStatus, User, Withdrawal};

pub type Result<T> = std::result::Result<T, StoreError>;

/// `apply_order_outcome` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 状态已写入，`credited` 为本次入账的积分
    Applied { credited: Decimal },
    /// 不满足状态机约束（含终态订单的重复结果），订单保持原样
    Ignored { current: OrderStatus },
}

/// 持久化存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // 用户
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User>;
    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>>;

    // 订单
    async fn create_order(&self, user_id: i64, number: &str) -> Result<Order>;
    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>>;
    /// 按上传时间倒序
    async fn get_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>>;
    /// 按上传时间正序（FIFO）
    async fn select_orders_by_status(
        &self,
        statuses: &[OrderStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>>;

    /// 在单个事务中写入订单的对账结果
    ///
    /// 状态变为 `PROCESSED` 且积分大于 0 时同时给 `owner_id` 的余额入账。
    /// 违反状态机的更新被忽略，因此同一终态结果重复写入只入账一次。
    async fn apply_order_outcome(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        owner_id: i64,
    ) -> Result<ApplyOutcome>;

    // 余额与提现
    async fn get_balance(&self, user_id: i64) -> Result<Balance>;
    /// 锁定余额行、检查可用积分、写入提现记录并扣减余额
    async fn process_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> Result<Withdrawal>;
    /// 按处理时间倒序
    async fn get_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>>;

    /// 存储可用性检查（就绪探针）
    async fn ping(&self) -> Result<()>;
}
