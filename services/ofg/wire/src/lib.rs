//! Message framing, typed records and decode dispatch for the OFG topology protocol.
//!
//! The protocol is a stream of length-prefixed binary messages exchanged
//! between a topology viewer and its backend controller. Every message
//! carries a transaction id so that asynchronous replies (statistics in
//! particular) can be matched to the request that caused them.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 length           | whole message, header incl.|
//! +----------------------+----------------------------+
//! | u8 type              | message type code          |
//! +----------------------+----------------------------+
//! | u32 xid              | transaction id             |
//! +----------------------+----------------------------+
//! | body                 | type-specific (0..65528B)  |
//! +----------------------+----------------------------+
//! ```
//!
//! All integers are big-endian. List bodies repeat a fixed-size record and
//! must be an exact multiple of it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod codec;
pub mod error;
pub mod ext;
pub mod flow;
pub mod frame;
pub mod header;
pub mod message;
pub mod registry;
pub mod request;
pub mod stats;
pub mod strings;
pub mod topology;

// Re-export main types
pub use auth::{AuthReply, AuthRequest, AuthStatus, AuthType};
pub use codec::Record;
pub use error::WireError;
pub use ext::{LinkFailure, LinkUtil, PowerComparison, PowerUsage, SwitchFailure, TrafficMatrix};
pub use flow::{Flow, FlowHop};
pub use frame::{Direction, MessageDecoder};
pub use header::{Header, MessageType, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use message::{Message, Payload, PollStart};
pub use request::{poll_interval_units, LinksRequest, Request, RequestType, ANY_TYPE};
pub use stats::{
    AggregateStatsReply, AggregateStatsRequest, Match, StatsHeader, StatsReply, StatsRequest,
    StatsType, SwitchDescription, Wildcards, ALL_TABLES, OFPP_NONE,
};
pub use topology::{LinkRecord, LinkSpec, LinkType, NodeRecord, NodeType};
