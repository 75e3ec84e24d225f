//! 业务服务层
//!
//! 用户注册登录、订单上传与提现。服务只依赖 `Store` 接口，
//! 由 handler 负责 HTTP 层面的编解码。

mod order_service;
mod user_service;
mod withdrawal_service;

pub use order_service::{OrderService, SubmitOutcome};
pub use user_service::UserService;
pub use withdrawal_service::WithdrawalService;
