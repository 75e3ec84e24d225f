//! 领域模型
//!
//! 用户、订单、余额与提现记录，以及订单状态机。

mod order;

pub use order::{Order, OrderStatus};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::FromRow;

/// 金额小数位数，与 `NUMERIC(14,2)` 一致
pub const MONEY_SCALE: u32 = 2;

/// 按数据库的舍入规则（四舍五入）截到分
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// 金额是否能精确存储，不丢失精度
pub fn fits_money_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// 用户
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
}

/// 用户余额
///
/// 没有记录的用户视为零余额。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct Balance {
    /// 可用积分
    pub current: Decimal,
    /// 累计已提现积分
    pub withdrawn: Decimal,
}

/// 提现记录，创建后不可变
#[derive(Debug, Clone, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    pub order_number: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}
