//! Process-wide node and link registry shared by every topology view.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::TopologyError;
use crate::link::{Link, LinkArena};
use crate::node::Node;
use crate::ref_track::{ConnectionId, RefTrack};

/// Nodes and links known to any view, with their owning connections
///
/// A node is created once and shared between all views that see it; it is
/// dropped from the registry when the last connection releases it.
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    nodes: Mutex<HashMap<u64, RefTrack<Arc<Node>>>>,
    links: LinkArena,
}

impl GlobalRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `owner`'s reference to `node`
    ///
    /// Returns the shared node and whether it was newly inserted. When the
    /// id is already known, `node` is discarded in favor of the existing one.
    pub fn claim(&self, owner: ConnectionId, node: Node) -> (Arc<Node>, bool) {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(&node.id()) {
            Some(existing) => {
                existing.add_ref(owner);
                (Arc::clone(&existing.obj), false)
            }
            None => {
                let id = node.id();
                let shared = Arc::new(node);
                nodes.insert(id, RefTrack::new(Arc::clone(&shared), owner));
                trace!("Node {:#x} added to the global registry", id);
                (shared, true)
            }
        }
    }

    /// Drop `owner`'s reference to `id`
    ///
    /// Returns the node if this was the last reference and it has been
    /// removed.
    pub fn release(&self, owner: ConnectionId, id: u64) -> Option<Arc<Node>> {
        let mut nodes = self.nodes.lock();
        let last = nodes.get_mut(&id)?.remove_ref(owner);
        if last {
            trace!("Node {:#x} removed from the global registry", id);
            nodes.remove(&id).map(|r| r.obj)
        } else {
            None
        }
    }

    /// Look up a node
    pub fn get(&self, id: u64) -> Option<Arc<Node>> {
        self.nodes.lock().get(&id).map(|r| Arc::clone(&r.obj))
    }

    /// Number of connections referring to `id`
    pub fn ref_count(&self, id: u64) -> usize {
        self.nodes.lock().get(&id).map_or(0, |r| r.ref_count())
    }

    /// Ids of every known node
    pub fn node_ids(&self) -> Vec<u64> {
        self.nodes.lock().keys().copied().collect()
    }

    /// The link arena
    pub fn links(&self) -> &LinkArena {
        &self.links
    }

    /// Tear down `link`: detach it from its endpoints and stop its stats
    pub fn disconnect_link(&self, link: &Link) -> Result<(), TopologyError> {
        let id = link.id();
        let src = self.get(id.src);
        let dst = self.get(id.dst);
        self.links.disconnect(link, src.as_deref(), dst.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{HasPorts, NodeKind};
    use ofg_wire::LinkType;

    #[test]
    fn test_claim_and_release() {
        let registry = GlobalRegistry::new();
        let a = ConnectionId(1);
        let b = ConnectionId(2);

        let (first, new) = registry.claim(a, Node::new(7, NodeKind::Switch));
        assert!(new);
        let (second, new) = registry.claim(b, Node::new(7, NodeKind::Host));
        assert!(!new);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.kind(), NodeKind::Switch);
        assert_eq!(registry.ref_count(7), 2);

        assert!(registry.release(a, 7).is_none());
        assert!(registry.get(7).is_some());
        assert!(registry.release(b, 7).is_some());
        assert!(registry.get(7).is_none());
        assert!(registry.release(b, 7).is_none());
    }

    #[test]
    fn test_disconnect_link_detaches_endpoints() {
        let registry = GlobalRegistry::new();
        let owner = ConnectionId(1);
        let (a, _) = registry.claim(owner, Node::new(1, NodeKind::Switch));
        let (b, _) = registry.claim(owner, Node::new(2, NodeKind::Switch));

        let link = registry.links().connect(&a, 1, &b, 1, LinkType::Wire).unwrap();
        registry.disconnect_link(&link).unwrap();
        assert!(a.link_ids().is_empty());
        assert!(b.link_ids().is_empty());
        assert!(registry.links().is_empty());
    }
}
