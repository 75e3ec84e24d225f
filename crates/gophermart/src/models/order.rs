//! 订单与订单状态机

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 订单状态
///
/// ```text
/// NEW ──> PROCESSING ──> { INVALID, PROCESSED }
///  └───────────────────> { INVALID, PROCESSED }
/// ```
///
/// `INVALID` 与 `PROCESSED` 为终态，不再迁移。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已上传，尚未被积分系统受理
    #[default]
    New,
    /// 积分系统计算中
    Processing,
    /// 积分系统拒绝计算
    Invalid,
    /// 计算完成
    Processed,
}

impl OrderStatus {
    /// 需要对账 Worker 继续推进的状态
    pub const PENDING: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    /// 是否允许迁移到 `next`
    ///
    /// 原地迁移不算迁移，终态没有出边。
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::New, Self::Processing | Self::Invalid | Self::Processed) => true,
            (Self::Processing, Self::Invalid | Self::Processed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户上传的积分订单
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub number: String,
    pub status: OrderStatus,
    /// 仅在 `PROCESSED` 时有值
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}
