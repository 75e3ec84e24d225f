//! 订单上传与列表

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::dto::OrderResponse;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::service::SubmitOutcome;
use crate::state::AppState;

/// POST /api/user/orders
///
/// 请求体为纯文本订单号。新订单返回 202，已由本人上传返回 200。
pub async fn submit_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<StatusCode> {
    let number = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("请求体不是合法的 UTF-8".to_string()))?;

    match state.orders.submit(user.user_id, number).await? {
        SubmitOutcome::Accepted(_) => Ok(StatusCode::ACCEPTED),
        SubmitOutcome::AlreadyUploaded(_) => Ok(StatusCode::OK),
    }
}

/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    let orders = state.orders.list(user.user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}
