//! JWT Token 处理
//!
//! HS256 签名，载荷为 `{sub, iss, iat, exp}`，`sub` 为用户 ID。

use chrono::{Duration, Utc};
use gophermart_shared::config::JwtSettings;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// JWT 配置
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// 签名密钥
    pub secret: String,
    /// Token 过期时间（秒）
    pub expires_in_secs: i64,
    /// Token 签发者
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtSettings::default().into()
    }
}

impl From<JwtSettings> for JwtConfig {
    fn from(settings: JwtSettings) -> Self {
        Self {
            secret: settings.secret,
            expires_in_secs: settings.ttl_secs,
            issuer: settings.issuer,
        }
    }
}

/// JWT Claims（Token 载荷）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    /// 签发者
    pub iss: String,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
}

impl Claims {
    /// 解析用户 ID
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthorized("无效的用户 ID".to_string()))
    }
}

/// JWT 管理器
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 为用户签发 Token
    pub fn generate_token(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.expires_in_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("JWT 生成失败: {}", e)))
    }

    /// 验证并解析 Token，无效或过期时返回 `Unauthorized`
    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token 已过期".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Unauthorized("无效的 Token".to_string())
                }
                _ => AppError::Unauthorized(format!("Token 验证失败: {}", e)),
            },
        )?;

        Ok(token_data.claims)
    }

    /// Token 有效期（秒）
    pub fn expires_in_secs(&self) -> i64 {
        self.config.expires_in_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify_token() {
        let manager = JwtManager::new(JwtConfig::default());

        let token = manager.generate_token(42).unwrap();
        let claims = manager.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.iss, "gophermart");
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[test]
    fn test_invalid_token() {
        let manager = JwtManager::new(JwtConfig::default());
        assert!(manager.verify_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtManager::new(JwtConfig {
            secret: "one".to_string(),
            ..Default::default()
        });
        let verifier = JwtManager::new(JwtConfig {
            secret: "two".to_string(),
            ..Default::default()
        });

        let token = issuer.generate_token(1).unwrap();
        assert!(matches!(
            verifier.verify_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        // 超出默认 60 秒的时钟偏差容忍
        let manager = JwtManager::new(JwtConfig {
            expires_in_secs: -120,
            ..Default::default()
        });
        let token = manager.generate_token(1).unwrap();
        assert!(manager.verify_token(&token).is_err());
    }
}
