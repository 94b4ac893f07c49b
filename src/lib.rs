//! Lottery agency client.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod client;
pub mod config;
pub mod net;
pub mod protocol;
pub mod shutdown;
pub mod source;
pub mod types;
