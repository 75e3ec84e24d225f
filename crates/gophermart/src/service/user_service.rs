//! 用户注册与登录

use std::sync::Arc;

use bcrypt::DEFAULT_COST;
use tracing::{info, instrument};

use crate::auth::{hash_password, verify_password};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::repository::Store;

pub struct UserService {
    store: Arc<dyn Store>,
    hash_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hash_cost: DEFAULT_COST,
        }
    }

    /// 覆盖 bcrypt 代价因子
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// 注册新用户，登录名已存在时返回 `LoginTaken`
    #[instrument(skip(self, password))]
    pub async fn register(&self, login: &str, password: &str) -> Result<User> {
        validate_credentials(login, password)?;

        let password_hash = hash_password(password, self.hash_cost).await?;
        let user = self.store.create_user(login, &password_hash).await?;

        info!(user_id = user.id, "用户注册成功");
        Ok(user)
    }

    /// 校验登录名与密码，用户不存在和密码错误返回同一种错误
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<User> {
        validate_credentials(login, password)?;

        let user = self
            .store
            .get_user_by_login(login)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }
}

fn validate_credentials(login: &str, password: &str) -> Result<()> {
    if login.trim().is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("登录名和密码不能为空".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::repository::MockStore;

    fn service(store: MockStore) -> UserService {
        UserService::new(Arc::new(store)).with_hash_cost(4 /* bcrypt minimum cost */)
    }

    #[tokio::test]
    async fn test_register_hashes_password() {
        let mut store = MockStore::new();
        store
            .expect_create_user()
            .withf(|login, hash| login == "alice" && hash.starts_with("$2") && hash != "pw")
            .times(1)
            .returning(|login, hash| {
                Ok(User {
                    id: 1,
                    login: login.to_string(),
                    password_hash: hash.to_string(),
                })
            });

        let user = service(store).register("alice", "pw").await.unwrap();
        assert_eq!(user.id, 1);
    }

    #[tokio::test]
    async fn test_register_login_taken() {
        let mut store = MockStore::new();
        store
            .expect_create_user()
            .returning(|_, _| Err(StoreError::LoginTaken));

        let err = service(store).register("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::LoginTaken));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let store = MockStore::new();
        let svc = service(store);

        assert!(matches!(
            svc.register("", "pw").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            svc.register("alice", "").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let hash = bcrypt::hash("pw", 4 /* bcrypt minimum cost */).unwrap();
        let mut store = MockStore::new();
        store.expect_get_user_by_login().returning(move |login| {
            Ok((login == "alice").then(|| User {
                id: 7,
                login: login.to_string(),
                password_hash: hash.clone(),
            }))
        });
        let svc = service(store);

        assert_eq!(svc.login("alice", "pw").await.unwrap().id, 7);
        assert!(matches!(
            svc.login("alice", "bad").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            svc.login("nobody", "pw").await,
            Err(AppError::InvalidCredentials)
        ));
    }
}
