//! JWT 认证中间件
//!
//! 从 `Authorization: Bearer` 头或 `jwt` Cookie 中提取 Token，
//! 验证后将当前用户注入请求扩展。

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::error::AppError;
use crate::state::AppState;

/// 携带 Token 的 Cookie 名称
pub const JWT_COOKIE: &str = "jwt";

/// 已认证用户，由中间件写入请求扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

/// 认证中间件，挂在受保护路由上
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return AppError::Unauthorized("缺少认证 Token".to_string()).into_response();
    };

    let user_id = match state
        .jwt_manager
        .verify_token(&token)
        .and_then(|claims| claims.user_id())
    {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(AuthUser { user_id });
    next.run(request).await
}

/// Bearer 头优先，其次是 Cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(JWT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_extract_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; jwt=tok"));
        assert_eq!(extract_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer h"));
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt=c"));
        assert_eq!(extract_token(&headers).as_deref(), Some("h"));
    }

    #[test]
    fn test_missing_or_malformed() {
        assert_eq!(extract_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }
}
