//! 注册与登录
//!
//! 成功时同时返回 `Authorization: Bearer` 头和 `jwt` Cookie，Cookie 有效期与 Token 一致。

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::json_rejection;
use crate::dto::Credentials;
use crate::error::{AppError, Result};
use crate::middleware::JWT_COOKIE;
use crate::state::AppState;

/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Response> {
    let Json(creds) = payload.map_err(json_rejection)?;
    let user = state.users.register(&creds.login, &creds.password).await?;
    token_response(&state, user.id)
}

/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Response> {
    let Json(creds) = payload.map_err(json_rejection)?;
    let user = state.users.login(&creds.login, &creds.password).await?;
    token_response(&state, user.id)
}

fn token_response(state: &AppState, user_id: i64) -> Result<Response> {
    let token = state.jwt_manager.generate_token(user_id)?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| AppError::Internal(format!("无效的 Token 头: {}", e)))?;

    let cookie = Cookie::build((JWT_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(state.jwt_manager.expires_in_secs()))
        .build();
    let cookie = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("无效的 Cookie: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::AUTHORIZATION, bearer), (header::SET_COOKIE, cookie)],
    )
        .into_response())
}
