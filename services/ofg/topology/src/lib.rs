//! Reference-counted topology store for the OFG client.
//!
//! Several backend connections may describe overlapping parts of the same
//! network, and several views may display it. Nodes and links live once in
//! a shared [`GlobalRegistry`]; each [`Topology`] view holds references on
//! behalf of the connections that announced them, so an object disappears
//! only when every connection that mentioned it has withdrawn it.
//!
//! Links also carry the traffic statistics the client polls for, from which
//! link utilization is derived.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod link;
pub mod node;
pub mod ref_track;
pub mod registry;
pub mod stats;
pub mod topology;

// Re-export main types
pub use error::{LinkAlreadyExists, TopologyError};
pub use link::{Link, LinkArena, LinkId, DEFAULT_MAX_DATA_RATE_BPS};
pub use node::{HasPorts, Node, NodeKind};
pub use ref_track::{ConnectionId, RefTrack};
pub use registry::GlobalRegistry;
pub use stats::{LinkStats, PortStatsRates, StatsSubscription};
pub use topology::{
    AddOutcome, Drawable, FlowEntry, NoopPresentation, Presentation, RemoveStatus, Topology,
};
