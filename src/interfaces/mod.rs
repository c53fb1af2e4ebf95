//! Outer adapters: CSV input/output for the CLI, request routing and the
//! broker payload codec.

pub mod csv;
pub mod requests;
pub mod wire;
