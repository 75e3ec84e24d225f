//! 外部积分计算系统接入

mod client;
mod cooldown;

pub use client::{
    AccrualReply, AccrualScorer, AccrualStatus, DEFAULT_RETRY_AFTER, HttpAccrualClient,
    ScorerError, normalize_base_url,
};
pub use cooldown::Cooldown;

#[cfg(test)]
pub use client::MockAccrualScorer;
