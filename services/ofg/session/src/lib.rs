//! Backend connections for the OFG client.
//!
//! This crate owns the socket side of the protocol: dialing a backend,
//! running the read loop, correlating stateful replies by xid, and
//! redialing after failures.
//!
//! ## Features
//!
//! - **Supervised connection**: one background task per backend, stopped
//!   through a cancellation token with a bounded join
//! - **Auto-reconnect**: exponential backoff from 250 ms up to a cap
//! - **Xid tracking**: one-shot and polled request tables with expiry
//! - **Debounced sends**: latest-value-wins flushing for interactive updates
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ofg_session::{Connection, ConnectionConfig, MessageProcessor};
//! use ofg_wire::{Message, Payload};
//!
//! struct Printer;
//!
//! impl MessageProcessor for Printer {
//!     fn process(&self, conn: &Connection, msg: Message) {
//!         if msg.payload == Payload::EchoRequest {
//!             let _ = conn.send(Message::with_xid(msg.xid, Payload::EchoReply));
//!         }
//!     }
//!
//!     fn connection_state_changed(&self, conn: &Connection, connected: bool) {
//!         println!("{} connected: {}", conn.addr(), connected);
//!     }
//! }
//!
//! # async fn example() {
//! let conn = Connection::new(1, ConnectionConfig::default());
//! conn.start(Arc::new(Printer));
//! // ...
//! conn.shutdown().await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod connection;
pub mod debounce;
pub mod error;
pub mod framing;
pub mod transport;
pub mod xid;

// Re-export main types
pub use backoff::Backoff;
pub use connection::{
    Connection, ConnectionConfig, ConnectionState, MessageProcessor, MessageSink, NetStats,
    DEFAULT_PORT,
};
pub use debounce::DebouncedSender;
pub use error::SessionError;
pub use framing::{recv_message, send_message};
pub use transport::{connect_tcp, listen_tcp};
pub use xid::{XidTracker, DEFAULT_REQUEST_MAX_AGE};
