//! Network layer.
//!
//! `transport` moves single newline-terminated frames over a byte stream;
//! `connection` owns the lifecycle of the one TCP session a request uses.

pub mod connection;
pub mod transport;

pub use connection::{Connector, Session, TcpConnector};
