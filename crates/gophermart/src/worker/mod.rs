//! 后台 Worker

mod reconciler;

pub use reconciler::{OrderOutcome, Reconciler, ReconcilerConfig, TickReport};
