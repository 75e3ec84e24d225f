//! 密码处理
//!
//! bcrypt 计算开销较大，放到阻塞线程池执行，避免占用异步 worker。

use bcrypt::{hash, verify};

use crate::error::AppError;

/// 以指定 bcrypt 代价因子对密码进行哈希处理
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("密码哈希任务失败: {}", e)))?
        .map_err(|e| AppError::Internal(format!("密码哈希失败: {}", e)))
}

/// 比较明文密码与存储的哈希值
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("密码验证任务失败: {}", e)))?
        .map_err(|e| AppError::Internal(format!("密码验证失败: {}", e)))
}
