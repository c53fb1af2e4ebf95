//! Adapters behind the domain ports.

pub mod broker;
pub mod cache;
pub mod clock;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
