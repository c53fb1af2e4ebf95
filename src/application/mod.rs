//! Application layer: orchestration of money movement over the domain ports.
//!
//! [`engine::TransferEngine`] is the entry point for withdraw, deposit,
//! transfer and scheduling. The scheduled pipeline ([`scheduler`]) and the
//! notification renderer ([`notifications`]) run as background tasks that
//! stop on a shared `watch` shutdown signal.

pub mod engine;
pub mod ledger;
pub mod limits;
pub mod locks;
pub mod notifications;
pub mod scheduler;
