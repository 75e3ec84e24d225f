//! 请求与响应 DTO
//!
//! 字段名与对外 API 保持一致（snake_case），时间使用 RFC3339。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Balance, Order, OrderStatus, Withdrawal};

/// 注册/登录请求
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// 订单列表项
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order.uploaded_at,
        }
    }
}

/// 余额
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current,
            withdrawn: balance.withdrawn,
        }
    }
}

/// 提现请求
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Decimal,
}

/// 提现记录
#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            order: w.order_number,
            sum: w.sum,
            processed_at: w.processed_at,
        }
    }
}
