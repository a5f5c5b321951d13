//! Session error types.

use ofg_wire::WireError;
use thiserror::Error;

/// Errors surfaced to callers of a connection
#[derive(Error, Debug)]
pub enum SessionError {
    /// The connection is not currently established
    #[error("connection is down")]
    NotConnected,

    /// `shutdown()` was called; no further sends are accepted
    #[error("connection is shutting down")]
    ShuttingDown,

    /// Socket failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be encoded or decoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// TCP connect did not complete in time
    #[error("connect timed out")]
    ConnectTimeout,
}
