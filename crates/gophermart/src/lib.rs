//! Gophermart 积分服务
//!
//! 用户上传购物订单号，由外部积分系统计算奖励积分，用户可用积分抵扣其他订单。
//!
//! ## 核心功能
//!
//! - **订单对账**：后台 worker 轮询积分系统，推进订单状态并在终态时原子入账
//! - **限流处理**：积分系统返回 429 时全局暂停查询，按 `Retry-After` 冷却
//! - **提现**：行锁保护下扣减余额，余额不会变为负数
//! - **认证**：bcrypt 存储密码，JWT（Bearer 头或 Cookie）鉴权
//!
//! ## 模块结构
//!
//! - `models`: 领域模型与订单状态机
//! - `repository`: 存储接口及 PostgreSQL / 内存实现
//! - `accrual`: 积分系统 HTTP 客户端与限流冷却
//! - `worker`: 订单对账 worker
//! - `service`: 用户、订单、提现业务逻辑
//! - `handlers` / `routes`: HTTP 接口
//! - `shutdown`: 关闭宽限期
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据库：sqlx (PostgreSQL)
//! - 金额：rust_decimal

pub mod accrual;
pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod luhn;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod test_utils;
pub mod worker;

/// 内嵌的数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

// 重新导出核心类型
pub use error::{AppError, Result, StoreError};
pub use models::{Balance, Order, OrderStatus, User, Withdrawal};
