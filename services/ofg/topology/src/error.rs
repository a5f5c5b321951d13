//! Topology error types.

use std::sync::Arc;

use ofg_session::SessionError;
use thiserror::Error;

use crate::link::Link;

/// A link with the same source, destination and ports is already known
#[derive(Error, Debug, Clone)]
#[error("link {} already exists", existing.id())]
pub struct LinkAlreadyExists {
    /// The link that was found
    pub existing: Arc<Link>,
}

/// Errors from topology mutations
#[derive(Error, Debug)]
pub enum TopologyError {
    /// Duplicate link; the caller may use the existing one
    #[error(transparent)]
    LinkAlreadyExists(#[from] LinkAlreadyExists),

    /// Link source node is not in this topology
    #[error("source node {0:#x} is missing")]
    SourceMissing(u64),

    /// Link destination node is not in this topology
    #[error("destination node {0:#x} is missing")]
    DestinationMissing(u64),

    /// Both endpoints exist but the link between them does not
    #[error("link is missing")]
    LinkMissing,

    /// A statistics request could not be sent
    #[error("send failed: {0}")]
    Send(#[from] SessionError),
}
