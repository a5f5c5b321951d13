//! Per-connection protocol logic for the OFG client.
//!
//! The session layer delivers decoded messages; this crate decides what
//! they mean. A [`ConnectionHandler`] subscribes to topology updates when
//! its connection comes up, applies node, link and flow changes to a
//! shared [`Topology`](ofg_topology::Topology), matches statistics replies
//! to the requests that caused them, and answers echo and authentication
//! requests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ofg_handler::{ConnectionHandler, Credentials, HandlerConfig, StaticCredentials};
//! use ofg_session::{Connection, ConnectionConfig};
//! use ofg_topology::{GlobalRegistry, NoopPresentation, Topology};
//!
//! # async fn run() {
//! let registry = Arc::new(GlobalRegistry::new());
//! let topology = Arc::new(Topology::new(registry, Arc::new(NoopPresentation)));
//! let conn = Connection::new(1, ConnectionConfig::default());
//! let handler = Arc::new(ConnectionHandler::new(
//!     Arc::clone(&conn),
//!     topology,
//!     Arc::new(StaticCredentials::new(Credentials::new("admin", ""))),
//!     HandlerConfig::default(),
//! ));
//! conn.start(handler.clone());
//! // ...
//! handler.shutdown().await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod credentials;
pub mod handler;

// Re-export main types
pub use backend::Backend;
pub use config::{HandlerConfig, DEFAULT_DEBOUNCE_DELAY};
pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use handler::{ConnectionHandler, MIN_SALT_LEN};
