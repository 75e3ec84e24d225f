//! 数据访问层

mod memory;
mod postgres;
mod traits;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{ApplyOutcome, Store};

#[cfg(test)]
pub use traits::MockStore;
