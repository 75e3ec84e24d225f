//! 积分计算系统客户端
//!
//! 调用 `GET {base}/api/orders/{number}` 查询订单积分。客户端内部不重试，
//! 退避与重试由对账 Worker 负责。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::models::OrderStatus;

/// 429 未携带合法 `Retry-After` 时的默认退避
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// 积分系统返回的订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    /// 映射为本地订单状态，`REGISTERED` 视为 `PROCESSING`
    pub fn to_order_status(self) -> OrderStatus {
        match self {
            Self::Registered | Self::Processing => OrderStatus::Processing,
            Self::Invalid => OrderStatus::Invalid,
            Self::Processed => OrderStatus::Processed,
        }
    }
}

/// 积分系统应答
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccrualReply {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default)]
    pub accrual: Option<Decimal>,
}

/// 积分系统查询错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScorerError {
    #[error("积分系统未登记该订单")]
    NotFound,
    #[error("积分系统限流，{retry_after:?} 后重试")]
    RateLimited { retry_after: Duration },
    #[error("积分系统不可用: {0}")]
    Unavailable(String),
}

/// 积分查询接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualScorer: Send + Sync {
    async fn query(&self, number: &str) -> Result<AccrualReply, ScorerError>;
}

/// 补全 URL scheme 并去掉末尾的 `/`
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// 解析 `Retry-After` 秒数，缺失或非法时使用默认值
fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// 基于 reqwest 的积分系统客户端
#[derive(Clone)]
pub struct HttpAccrualClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// 创建客户端，每次请求都受 `timeout` 约束
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ScorerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Unavailable(format!("构建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AccrualScorer for HttpAccrualClient {
    async fn query(&self, number: &str) -> Result<AccrualReply, ScorerError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScorerError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let reply: AccrualReply = response
                    .json()
                    .await
                    .map_err(|e| ScorerError::Unavailable(format!("应答解析失败: {e}")))?;
                if reply.accrual.is_some_and(|a| a.is_sign_negative()) {
                    return Err(ScorerError::Unavailable(format!(
                        "订单 {} 的积分为负数",
                        reply.order
                    )));
                }
                Ok(reply)
            }
            StatusCode::NO_CONTENT => Err(ScorerError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(
                    response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok()),
                );
                debug!(?retry_after, "积分系统限流");
                Err(ScorerError::RateLimited { retry_after })
            }
            other => Err(ScorerError::Unavailable(format!("意外的状态码 {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;

    /// 启动本地模拟积分系统，按订单号返回不同应答
    async fn spawn_mock() -> String {
        async fn handler(Path(number): Path<String>) -> axum::response::Response {
            match number.as_str() {
                "12345678903" => Json(json!({
                    "order": number,
                    "status": "PROCESSED",
                    "accrual": 500.5
                }))
                .into_response(),
                "79927398713" => Json(json!({ "order": number, "status": "REGISTERED" }))
                    .into_response(),
                "18" => AxumStatus::NO_CONTENT.into_response(),
                "26" => {
                    let mut headers = HeaderMap::new();
                    headers.insert("Retry-After", "7".parse().unwrap());
                    (AxumStatus::TOO_MANY_REQUESTS, headers).into_response()
                }
                "34" => AxumStatus::TOO_MANY_REQUESTS.into_response(),
                "42" => (AxumStatus::OK, "not json").into_response(),
                "59" => Json(json!({ "order": number, "status": "PROCESSED", "accrual": -1 }))
                    .into_response(),
                _ => AxumStatus::INTERNAL_SERVER_ERROR.into_response(),
            }
        }

        let app = Router::new().route("/api/orders/{number}", get(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        // 不带 scheme，顺便验证地址规范化
        addr.to_string()
    }

    async fn client() -> HttpAccrualClient {
        HttpAccrualClient::new(&spawn_mock().await, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("localhost:8081"), "http://localhost:8081");
        assert_eq!(normalize_base_url("http://accrual:8080/"), "http://accrual:8080");
        assert_eq!(normalize_base_url(" https://a.example "), "https://a.example");
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Duration::from_secs(2));
        assert_eq!(parse_retry_after(Some("soon")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(None), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AccrualStatus::Registered.to_order_status(), OrderStatus::Processing);
        assert_eq!(AccrualStatus::Processing.to_order_status(), OrderStatus::Processing);
        assert_eq!(AccrualStatus::Invalid.to_order_status(), OrderStatus::Invalid);
        assert_eq!(AccrualStatus::Processed.to_order_status(), OrderStatus::Processed);
    }

    #[tokio::test]
    async fn test_query_success() {
        let client = client().await;
        assert!(client.base_url().starts_with("http://127.0.0.1:"));

        let reply = client.query("12345678903").await.unwrap();
        assert_eq!(reply.status, AccrualStatus::Processed);
        assert_eq!(reply.accrual, Some(dec!(500.5)));

        let reply = client.query("79927398713").await.unwrap();
        assert_eq!(reply.status, AccrualStatus::Registered);
        assert_eq!(reply.accrual, None);
    }

    #[tokio::test]
    async fn test_query_error_mapping() {
        let client = client().await;

        assert!(matches!(client.query("18").await, Err(ScorerError::NotFound)));
        assert!(matches!(
            client.query("26").await,
            Err(ScorerError::RateLimited { retry_after }) if retry_after == Duration::from_secs(7)
        ));
        assert!(matches!(
            client.query("34").await,
            Err(ScorerError::RateLimited { retry_after }) if retry_after == DEFAULT_RETRY_AFTER
        ));
        assert!(matches!(client.query("42").await, Err(ScorerError::Unavailable(_))));
        assert!(matches!(client.query("59").await, Err(ScorerError::Unavailable(_))));
        assert!(matches!(client.query("67").await, Err(ScorerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_network_error_is_unavailable() {
        // 绑定后立即释放端口，连接会被拒绝
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpAccrualClient::new(&addr.to_string(), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.query("12345678903").await,
            Err(ScorerError::Unavailable(_))
        ));
    }
}
