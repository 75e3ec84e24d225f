//! 共享库
//!
//! 包含配置加载、错误类型、数据库连接池、重试策略与可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod retry;
