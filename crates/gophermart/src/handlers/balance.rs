//! 余额、提现与提现记录

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::json_rejection;
use crate::dto::{BalanceResponse, WithdrawRequest, WithdrawalResponse};
use crate::error::Result;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>> {
    let balance = state.withdrawals.balance(user.user_id).await?;
    Ok(Json(balance.into()))
}

/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(req) = payload.map_err(json_rejection)?;
    state
        .withdrawals
        .withdraw(user.user_id, &req.order, req.sum)
        .await?;
    Ok(StatusCode::OK)
}

/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    let withdrawals = state.withdrawals.list(user.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}
