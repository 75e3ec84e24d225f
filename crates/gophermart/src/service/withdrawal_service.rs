//! 余额查询与积分提现
//!
//! 提现订单号与积分订单号互不关联，只要求通过 Luhn 校验且全局唯一。

use std::sync::Arc;

use gophermart_shared::observability::metrics;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::luhn;
use crate::models::{Balance, Withdrawal, fits_money_scale};
use crate::repository::Store;

pub struct WithdrawalService {
    store: Arc<dyn Store>,
}

impl WithdrawalService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, user_id: i64) -> Result<Balance> {
        Ok(self.store.get_balance(user_id).await?)
    }

    /// 扣减余额并记录提现
    #[instrument(skip(self))]
    pub async fn withdraw(&self, user_id: i64, order: &str, sum: Decimal) -> Result<Withdrawal> {
        let order = order.trim();
        if !luhn::is_valid(order) {
            return Err(AppError::Validation(format!("无效的订单号: {}", order)));
        }
        if sum <= Decimal::ZERO {
            return Err(AppError::Validation("提现金额必须大于 0".to_string()));
        }
        // 不足一分的金额会被数据库按列分别舍入，破坏余额等式
        if !fits_money_scale(sum) {
            return Err(AppError::Validation("提现金额最多两位小数".to_string()));
        }

        match self.store.process_withdrawal(user_id, order, sum).await {
            Ok(withdrawal) => {
                metrics::record_withdrawal("ok");
                info!(order = %withdrawal.order_number, sum = %withdrawal.sum, "提现成功");
                Ok(withdrawal)
            }
            Err(e) => {
                let err = AppError::from(e);
                let outcome = match &err {
                    AppError::InsufficientFunds => "insufficient_funds",
                    AppError::WithdrawalTaken => "duplicate",
                    _ => "error",
                };
                metrics::record_withdrawal(outcome);
                warn!(outcome, "提现被拒绝");
                Err(err)
            }
        }
    }

    /// 按处理时间倒序
    pub async fn list(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        Ok(self.store.get_withdrawals_by_user(user_id).await?)
    }
}
