//! 订单上传与查询
//!
//! 上传只做校验和入库，不调用积分系统，后续由对账 worker 推进状态。

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{AppError, Result, StoreError};
use crate::luhn;
use crate::models::Order;
use crate::repository::Store;

/// 订单上传结果
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 新订单已受理
    Accepted(Order),
    /// 当前用户已上传过该订单
    AlreadyUploaded(Order),
}

pub struct OrderService {
    store: Arc<dyn Store>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 上传订单号
    ///
    /// 空请求体返回 `BadRequest`，非数字或 Luhn 校验失败返回 `Validation`，
    /// 订单属于其他用户返回 `OrderOwnedByOther`。
    #[instrument(skip(self))]
    pub async fn submit(&self, user_id: i64, raw: &str) -> Result<SubmitOutcome> {
        let number = raw.trim();
        if number.is_empty() {
            return Err(AppError::BadRequest("订单号为空".to_string()));
        }
        if !luhn::is_valid(number) {
            return Err(AppError::Validation(format!("无效的订单号: {}", number)));
        }

        if let Some(existing) = self.store.get_order_by_number(number).await? {
            return classify_existing(user_id, existing);
        }

        match self.store.create_order(user_id, number).await {
            Ok(order) => {
                info!(order = %order.number, "订单已受理");
                Ok(SubmitOutcome::Accepted(order))
            }
            // 并发上传同一订单号，以已入库的记录为准
            Err(StoreError::OrderTaken) => {
                let existing = self.store.get_order_by_number(number).await?.ok_or_else(|| {
                    AppError::Internal(format!("订单 {} 冲突后未找到", number))
                })?;
                classify_existing(user_id, existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 当前用户的订单，按上传时间倒序
    pub async fn list(&self, user_id: i64) -> Result<Vec<Order>> {
        Ok(self.store.get_orders_by_user(user_id).await?)
    }
}

fn classify_existing(user_id: i64, existing: Order) -> Result<SubmitOutcome> {
    if existing.user_id == user_id {
        Ok(SubmitOutcome::AlreadyUploaded(existing))
    } else {
        Err(AppError::OrderOwnedByOther)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use crate::repository::MockStore;
    use chrono::Utc;

    fn order(user_id: i64, number: &str) -> Order {
        Order {
            id: 1,
            user_id,
            number: number.to_string(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_submit_new_order() {
        let mut store = MockStore::new();
        store.expect_get_order_by_number().returning(|_| Ok(None));
        store
            .expect_create_order()
            .withf(|user_id, number| *user_id == 1 && number == "12345678903")
            .times(1)
            .returning(|user_id, number| Ok(order(user_id, number)));

        let svc = OrderService::new(Arc::new(store));
        let outcome = svc.submit(1, "12345678903\n").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted(o) if o.status == OrderStatus::New));
    }

    #[tokio::test]
    async fn test_submit_existing_order() {
        let mut store = MockStore::new();
        store
            .expect_get_order_by_number()
            .returning(|number| Ok(Some(order(1, number))));
        store.expect_create_order().never();
        let svc = OrderService::new(Arc::new(store));

        assert!(matches!(
            svc.submit(1, "12345678903").await,
            Ok(SubmitOutcome::AlreadyUploaded(_))
        ));
        assert!(matches!(
            svc.submit(2, "12345678903").await,
            Err(AppError::OrderOwnedByOther)
        ));
    }

    #[tokio::test]
    async fn test_submit_race_resolves_to_owner() {
        let mut store = MockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_get_order_by_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        store
            .expect_create_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(StoreError::OrderTaken));
        store
            .expect_get_order_by_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|number| Ok(Some(order(9, number))));

        let svc = OrderService::new(Arc::new(store));
        assert!(matches!(
            svc.submit(1, "12345678903").await,
            Err(AppError::OrderOwnedByOther)
        ));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let mut store = MockStore::new();
        store.expect_get_order_by_number().never();
        let svc = OrderService::new(Arc::new(store));

        assert!(matches!(svc.submit(1, "").await, Err(AppError::BadRequest(_))));
        assert!(matches!(svc.submit(1, "  \n").await, Err(AppError::BadRequest(_))));
        assert!(matches!(svc.submit(1, "12a45").await, Err(AppError::Validation(_))));
        assert!(matches!(
            svc.submit(1, "12345678900").await,
            Err(AppError::Validation(_))
        ));
    }
}
