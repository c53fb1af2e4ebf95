//! Domain layer: entities, value objects, policies and the ports the
//! application layer talks to.

pub mod account;
pub mod cache_keys;
pub mod events;
pub mod fee;
pub mod ports;
pub mod transaction;
