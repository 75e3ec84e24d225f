//! 内存存储实现
//!
//! 与 PostgreSQL 实现遵循同一套约束（唯一性、状态机、余额非负），
//! 用于测试和本地调试。单把互斥锁保证每个操作原子执行。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::traits::{ApplyOutcome, Result, Store};
use crate::error::StoreError;
use crate::models::{Balance, Order, OrderStatus, User, Withdrawal, round_money};

#[derive(Default)]
struct Inner {
    next_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
    users: Vec<User>,
    orders: Vec<Order>,
    balances: HashMap<i64, Balance>,
    withdrawals: Vec<Withdrawal>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// 单调递增的时间戳，保证插入顺序与时间顺序一致
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        let mut inner = self.inner.lock();
        if inner.users.iter().any(|u| u.login == login) {
            return Err(StoreError::LoginTaken);
        }

        let user = User {
            id: inner.next_id(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let inner = self.inner.lock();
        Ok(inner.users.iter().find(|u| u.login == login).cloned())
    }

    async fn create_order(&self, user_id: i64, number: &str) -> Result<Order> {
        let mut inner = self.inner.lock();
        if inner.orders.iter().any(|o| o.number == number) {
            return Err(StoreError::OrderTaken);
        }

        let order = Order {
            id: inner.next_id(),
            user_id,
            number: number.to_string(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: inner.now(),
        };
        inner.orders.push(order.clone());
        Ok(order)
    }

    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let inner = self.inner.lock();
        Ok(inner.orders.iter().find(|o| o.number == number).cloned())
    }

    async fn get_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.uploaded_at, b.id).cmp(&(a.uploaded_at, a.id)));
        Ok(orders)
    }

    async fn select_orders_by_status(
        &self,
        statuses: &[OrderStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.uploaded_at, o.id));

        Ok(orders
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn apply_order_outcome(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        owner_id: i64,
    ) -> Result<ApplyOutcome> {
        let mut inner = self.inner.lock();

        let order = inner
            .orders
            .iter_mut()
            .find(|o| o.number == number)
            .ok_or_else(|| StoreError::OrderNotFound(number.to_string()))?;

        if order.user_id != owner_id {
            return Err(StoreError::Corrupt(format!(
                "订单 {number} 属于用户 {}，而非 {owner_id}",
                order.user_id
            )));
        }
        if !order.status.can_transition_to(status) {
            return Ok(ApplyOutcome::Ignored {
                current: order.status,
            });
        }

        let accrual = match status {
            OrderStatus::Processed => Some(round_money(accrual.unwrap_or(Decimal::ZERO))),
            _ => None,
        };
        order.status = status;
        order.accrual = accrual;

        let credited = accrual.filter(|a| *a > Decimal::ZERO).unwrap_or(Decimal::ZERO);
        if credited > Decimal::ZERO {
            inner.balances.entry(owner_id).or_default().current += credited;
        }

        Ok(ApplyOutcome::Applied { credited })
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let inner = self.inner.lock();
        Ok(inner.balances.get(&user_id).copied().unwrap_or_default())
    }

    async fn process_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> Result<Withdrawal> {
        let mut inner = self.inner.lock();

        let current = inner.balances.get(&user_id).map(|b| b.current).unwrap_or_default();
        if current < sum {
            return Err(StoreError::InsufficientFunds);
        }
        if inner.withdrawals.iter().any(|w| w.order_number == order_number) {
            return Err(StoreError::WithdrawalTaken);
        }

        let withdrawal = Withdrawal {
            id: inner.next_id(),
            user_id,
            order_number: order_number.to_string(),
            sum,
            processed_at: inner.now(),
        };
        inner.withdrawals.push(withdrawal.clone());

        let balance = inner.balances.entry(user_id).or_default();
        balance.current -= sum;
        balance.withdrawn += sum;

        Ok(withdrawal)
    }

    async fn get_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let inner = self.inner.lock();
        let mut withdrawals: Vec<Withdrawal> = inner
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| (b.processed_at, b.id).cmp(&(a.processed_at, a.id)));
        Ok(withdrawals)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
