//! 错误类型定义
//!
//! `StoreError` 是存储层错误，`AppError` 是服务层对外暴露的错误类型，
//! 由 `IntoResponse` 统一映射为 HTTP 状态码与 `{"error": CODE}` 响应体。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("登录名已被占用")]
    LoginTaken,
    #[error("订单号已存在")]
    OrderTaken,
    #[error("订单不存在: {0}")]
    OrderNotFound(String),
    #[error("提现订单号已存在")]
    WithdrawalTaken,
    #[error("余额不足")]
    InsufficientFunds,
    #[error("存储数据不一致: {0}")]
    Corrupt(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

/// 服务层错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 请求错误
    #[error("请求格式错误: {0}")]
    BadRequest(String),
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("用户名或密码错误")]
    InvalidCredentials,

    // 业务错误
    #[error("登录名已被占用")]
    LoginTaken,
    #[error("订单已被其他用户上传")]
    OrderOwnedByOther,
    #[error("余额不足")]
    InsufficientFunds,
    #[error("该订单号已提现")]
    WithdrawalTaken,

    // 系统错误
    #[error("存储错误: {0}")]
    Store(StoreError),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) | Self::WithdrawalTaken => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::LoginTaken | Self::OrderOwnedByOther => StatusCode::CONFLICT,
            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::LoginTaken => "LOGIN_TAKEN",
            Self::OrderOwnedByOther => "ORDER_OWNED_BY_OTHER",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::WithdrawalTaken => "WITHDRAWAL_TAKEN",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LoginTaken => Self::LoginTaken,
            StoreError::InsufficientFunds => Self::InsufficientFunds,
            StoreError::WithdrawalTaken => Self::WithdrawalTaken,
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只记录日志，响应体只带错误码
        match &self {
            Self::Store(e) => tracing::error!(error = %e, "存储操作失败"),
            Self::Internal(e) => tracing::error!(error = %e, "内部错误"),
            other => tracing::debug!(error = %other, "请求被拒绝"),
        }

        let body = json!({ "error": self.error_code() });
        (status, axum::Json(body)).into_response()
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, AppError>;
