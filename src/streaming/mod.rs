//! Websocket sessions to ledger nodes
//!
//! [`connection`] owns one session (handshake, history check, reader and
//! writer tasks, id-correlated lookups), [`manager`] memoizes one session
//! per endpoint and carries the engine-wide stream of validated
//! transactions, [`message`] holds the wire format.

pub mod connection;
pub mod manager;
pub mod message;

pub use connection::{Connection, ConnectionState, QueryAnswer, QueryError};
pub use manager::ConnectionManager;
