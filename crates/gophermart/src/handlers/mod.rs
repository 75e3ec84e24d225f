//! HTTP 处理器
//!
//! 所有 `/api/user/*` 端点，以及健康检查。

pub mod balance;
pub mod health;
pub mod orders;
pub mod user;

use axum::extract::rejection::JsonRejection;

use crate::error::AppError;

/// JSON 解析失败统一映射为 400
fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}
