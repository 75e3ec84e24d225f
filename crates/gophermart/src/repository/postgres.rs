//! PostgreSQL 存储实现
//!
//! 对账入账与提现是仅有的多行写操作，两者都在单个事务内以 `SELECT ... FOR UPDATE`
//! 锁定余额行，按用户串行化余额变更。

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use super::traits::{ApplyOutcome, Result, Store};
use crate::error::StoreError;
use crate::models::{Balance, Order, OrderStatus, User, Withdrawal, round_money};

/// 判断是否为唯一约束冲突（SQLSTATE 23505）
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 确保余额行存在并加行锁，返回锁定后的余额
    async fn lock_balance(conn: &mut PgConnection, user_id: i64) -> Result<Balance> {
        sqlx::query(
            r#"
            INSERT INTO balances (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT current, withdrawn
            FROM balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(balance)
    }
}

#[async_trait]
impl Store for PgStore {
    // ==================== 用户 ====================

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (login, password_hash)
            VALUES ($1, $2)
            RETURNING id, login, password_hash
            "#,
        )
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::LoginTaken
            } else {
                e.into()
            }
        })
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // ==================== 订单 ====================

    async fn create_order(&self, user_id: i64, number: &str) -> Result<Order> {
        sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (user_id, number, status)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, number, status, accrual, uploaded_at
            "#,
        )
        .bind(user_id)
        .bind(number)
        .bind(OrderStatus::New)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::OrderTaken
            } else {
                e.into()
            }
        })
    }

    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_orders_by_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn select_orders_by_status(
        &self,
        statuses: &[OrderStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE status = ANY($1)
            ORDER BY uploaded_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(statuses)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    #[instrument(skip(self, accrual))]
    async fn apply_order_outcome(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
        owner_id: i64,
    ) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, OrderStatus)> = sqlx::query_as(
            r#"
            SELECT user_id, status
            FROM orders
            WHERE number = $1
            FOR UPDATE
            "#,
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let (user_id, current) = row.ok_or_else(|| StoreError::OrderNotFound(number.to_string()))?;
        if user_id != owner_id {
            return Err(StoreError::Corrupt(format!(
                "订单 {number} 属于用户 {user_id}，而非 {owner_id}"
            )));
        }

        if !current.can_transition_to(status) {
            tx.rollback().await?;
            debug!(%current, "订单状态不允许迁移，忽略本次结果");
            return Ok(ApplyOutcome::Ignored { current });
        }

        // 积分只在 PROCESSED 时记录
        let accrual = match status {
            OrderStatus::Processed => Some(round_money(accrual.unwrap_or(Decimal::ZERO))),
            _ => None,
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3, updated_at = NOW()
            WHERE number = $1
            "#,
        )
        .bind(number)
        .bind(status)
        .bind(accrual)
        .execute(&mut *tx)
        .await?;

        let credited = accrual.filter(|a| *a > Decimal::ZERO).unwrap_or(Decimal::ZERO);
        if credited > Decimal::ZERO {
            Self::lock_balance(&mut *tx, owner_id).await?;

            sqlx::query(
                r#"
                UPDATE balances
                SET current = current + $2
                WHERE user_id = $1
                "#,
            )
            .bind(owner_id)
            .bind(credited)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(ApplyOutcome::Applied { credited })
    }

    // ==================== 余额与提现 ====================

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT current, withdrawn
            FROM balances
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn process_withdrawal(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> Result<Withdrawal> {
        let mut tx = self.pool.begin().await?;

        let balance = Self::lock_balance(&mut *tx, user_id).await?;
        if balance.current < sum {
            tx.rollback().await?;
            return Err(StoreError::InsufficientFunds);
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (user_id, order_number, sum)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, order_number, sum, processed_at
            "#,
        )
        .bind(user_id)
        .bind(order_number)
        .bind(sum)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::WithdrawalTaken
            } else {
                e.into()
            }
        })?;

        sqlx::query(
            r#"
            UPDATE balances
            SET current = current - $2, withdrawn = withdrawn + $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(sum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(withdrawal)
    }

    async fn get_withdrawals_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
