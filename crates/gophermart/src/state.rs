//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use crate::auth::JwtManager;
use crate::repository::Store;
use crate::service::{OrderService, UserService, WithdrawalService};

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jwt_manager: Arc<JwtManager>,
    pub users: Arc<UserService>,
    pub orders: Arc<OrderService>,
    pub withdrawals: Arc<WithdrawalService>,
}

impl AppState {
    /// 基于同一个存储创建全部服务
    pub fn new(store: Arc<dyn Store>, jwt_manager: JwtManager) -> Self {
        Self::with_user_service(
            store.clone(),
            jwt_manager,
            UserService::new(store),
        )
    }

    /// 使用自定义的用户服务（例如调低 bcrypt 代价）
    pub fn with_user_service(
        store: Arc<dyn Store>,
        jwt_manager: JwtManager,
        users: UserService,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(store.clone())),
            withdrawals: Arc::new(WithdrawalService::new(store.clone())),
            users: Arc::new(users),
            jwt_manager: Arc::new(jwt_manager),
            store,
        }
    }
}
