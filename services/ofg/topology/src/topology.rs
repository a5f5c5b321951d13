//! Per-view topology store.
//!
//! A [`Topology`] is what one view (one window, one output) shows. It holds
//! local references to nodes in the shared [`GlobalRegistry`] on behalf of
//! the connections feeding it, and tells its [`Presentation`] when
//! something appears, disappears or changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ofg_wire::{AggregateStatsReply, Flow, LinkSpec, Match, Message, SwitchDescription};
use tracing::{debug, warn};

use crate::error::{LinkAlreadyExists, TopologyError};
use crate::link::{Link, LinkId};
use crate::node::{HasPorts, Node};
use crate::ref_track::{ConnectionId, RefTrack};
use crate::registry::GlobalRegistry;

/// Something a presentation draws
#[derive(Debug, Clone)]
pub enum Drawable {
    /// A node
    Node(Arc<Node>),
    /// A link
    Link(Arc<Link>),
    /// One flow path
    Flow(Flow),
}

/// Receives topology changes for display
pub trait Presentation: Send + Sync {
    /// A new object should be shown
    fn add_drawable(&self, drawable: &Drawable);

    /// An object went away
    fn remove_drawable(&self, drawable: &Drawable);

    /// A link's utilization changed; -1 means unknown
    fn link_utilization_changed(&self, link: LinkId, utilization: f64);

    /// An extension message the core does not interpret
    fn extension_received(&self, msg: &Message);
}

/// Presentation that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresentation;

impl Presentation for NoopPresentation {
    fn add_drawable(&self, _drawable: &Drawable) {}
    fn remove_drawable(&self, _drawable: &Drawable) {}
    fn link_utilization_changed(&self, _link: LinkId, _utilization: f64) {}
    fn extension_received(&self, _msg: &Message) {}
}

/// Result of adding a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// The node was not in this view before
    pub local_new: bool,
    /// The node was not in any view before
    pub global_new: bool,
}

/// Result of removing a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    /// The node was not in this view
    NotPresent,
    /// Another connection feeding this view still refers to it
    StillReferencedLocally,
    /// Gone from this view, still present in another
    RemovedLocally,
    /// Gone everywhere
    RemovedGlobally,
}

/// Flows sharing one flow id
#[derive(Debug, Clone)]
pub struct FlowEntry {
    /// Connection that announced them
    pub owner: ConnectionId,
    /// Flow paths
    pub flows: Vec<Flow>,
}

/// Nodes, links and flows shown by one view
pub struct Topology {
    registry: Arc<GlobalRegistry>,
    nodes: DashMap<u64, RefTrack<Arc<Node>>>,
    flows: DashMap<u32, FlowEntry>,
    presentation: Arc<dyn Presentation>,
    shutting_down: AtomicBool,
}

impl Topology {
    /// Empty view over `registry`
    pub fn new(registry: Arc<GlobalRegistry>, presentation: Arc<dyn Presentation>) -> Self {
        Self {
            registry,
            nodes: DashMap::new(),
            flows: DashMap::new(),
            presentation,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Shared registry this view refers into
    pub fn registry(&self) -> &Arc<GlobalRegistry> {
        &self.registry
    }

    /// Where changes are reported
    pub fn presentation(&self) -> &Arc<dyn Presentation> {
        &self.presentation
    }

    /// Stop warning about missing objects; teardown removes them in bulk
    pub fn set_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Whether teardown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    /// Add `owner`'s reference to a node; true iff the node is new globally
    pub fn add_node(&self, owner: ConnectionId, node: Node) -> bool {
        self.add_node_detailed(owner, node).global_new
    }

    /// Add `owner`'s reference to a node, reporting local and global novelty
    pub fn add_node_detailed(&self, owner: ConnectionId, node: Node) -> AddOutcome {
        match self.nodes.entry(node.id()) {
            Entry::Occupied(mut local) => {
                local.get_mut().add_ref(owner);
                self.registry.claim(owner, node);
                AddOutcome {
                    local_new: false,
                    global_new: false,
                }
            }
            Entry::Vacant(slot) => {
                let (shared, global_new) = self.registry.claim(owner, node);
                slot.insert(RefTrack::new(Arc::clone(&shared), owner));
                self.presentation.add_drawable(&Drawable::Node(shared));
                AddOutcome {
                    local_new: true,
                    global_new,
                }
            }
        }
    }

    /// Drop `owner`'s reference to node `id`
    ///
    /// The node leaves this view's presentation once no connection feeding
    /// the view refers to it. When the last reference anywhere goes, every
    /// link attached to the node is disconnected too.
    pub fn remove_node(&self, owner: ConnectionId, id: u64) -> RemoveStatus {
        // Local and global owner sets change under one entry guard so a
        // concurrent add for the same id sees either both or neither.
        let (unviewed, released) = match self.nodes.entry(id) {
            Entry::Occupied(mut local) => {
                let local_empty = local.get_mut().remove_ref(owner);
                let released = self.registry.release(owner, id);
                let unviewed = local_empty.then(|| local.remove().obj);
                (unviewed, released)
            }
            Entry::Vacant(_) => return RemoveStatus::NotPresent,
        };

        if let Some(node) = &unviewed {
            self.presentation
                .remove_drawable(&Drawable::Node(Arc::clone(node)));
        }

        match (released, unviewed) {
            (Some(node), _) => {
                for link_id in node.link_ids() {
                    if let Some(link) = self.registry.links().get(&link_id) {
                        let _ = self.teardown_link(link);
                    }
                    node.detach(&link_id);
                }
                RemoveStatus::RemovedGlobally
            }
            (None, Some(_)) => RemoveStatus::RemovedLocally,
            (None, None) => RemoveStatus::StillReferencedLocally,
        }
    }

    /// Remove every link, node and flow `owner` contributed
    pub fn remove_all(&self, owner: ConnectionId) {
        for link in self.registry.links().owned_by(owner) {
            if link.release(owner) {
                let _ = self.teardown_link(link);
            }
        }

        let ids: Vec<u64> = self
            .nodes
            .iter()
            .filter(|r| r.is_owned_by(owner))
            .map(|r| *r.key())
            .collect();
        for id in ids {
            self.remove_node(owner, id);
        }

        let flow_ids: Vec<u32> = self
            .flows
            .iter()
            .filter(|f| f.owner == owner)
            .map(|f| *f.key())
            .collect();
        for id in flow_ids {
            self.remove_flows(id);
        }
    }

    /// Node `id` if this view has it
    pub fn get_node(&self, id: u64) -> Option<Arc<Node>> {
        self.nodes.get(&id).map(|r| Arc::clone(&r.obj))
    }

    /// Ids of the nodes in this view
    pub fn get_node_ids(&self) -> Vec<u64> {
        self.nodes.iter().map(|r| *r.key()).collect()
    }

    /// Whether this view has node `id`
    pub fn has_node(&self, id: u64) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node `id` from any view
    pub fn global_get_node(&self, id: u64) -> Option<Arc<Node>> {
        self.registry.get(id)
    }

    /// Link `id` if it exists
    pub fn get_link(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.registry.links().get(id)
    }

    /// Add `owner`'s claim to the link described by `spec`
    ///
    /// Both endpoints must be in this view. A duplicate is reported as
    /// [`TopologyError::LinkAlreadyExists`] after `owner`'s claim on the
    /// existing link has been recorded.
    pub fn add_link(&self, owner: ConnectionId, spec: &LinkSpec) -> Result<Arc<Link>, TopologyError> {
        let rec = &spec.link;
        let src = self
            .get_node(rec.src.id)
            .ok_or(TopologyError::SourceMissing(rec.src.id))?;
        let dst = self
            .get_node(rec.dst.id)
            .ok_or(TopologyError::DestinationMissing(rec.dst.id))?;

        match self
            .registry
            .links()
            .connect(&src, rec.src_port, &dst, rec.dst_port, rec.link_type)
        {
            Ok(link) => {
                link.set_link_type(rec.link_type);
                link.set_max_data_rate_bps(spec.capacity_bps);
                link.claim(owner);
                self.presentation
                    .add_drawable(&Drawable::Link(Arc::clone(&link)));
                Ok(link)
            }
            Err(LinkAlreadyExists { existing }) => {
                existing.claim(owner);
                Err(LinkAlreadyExists { existing }.into())
            }
        }
    }

    /// Drop `owner`'s claim on the link `src:src_port -> dst:dst_port`
    ///
    /// The link is torn down when no claims remain.
    pub fn disconnect_link(
        &self,
        owner: ConnectionId,
        src_id: u64,
        src_port: u16,
        dst_id: u64,
        dst_port: u16,
    ) -> Result<(), TopologyError> {
        let src = self
            .get_node(src_id)
            .ok_or(TopologyError::SourceMissing(src_id))?;
        if !self.has_node(dst_id) {
            return Err(TopologyError::DestinationMissing(dst_id));
        }
        let link = src
            .directed_link_to(src_port, dst_id, dst_port)
            .and_then(|id| self.registry.links().get(&id))
            .ok_or(TopologyError::LinkMissing)?;

        if link.release(owner) {
            self.teardown_link(link)
        } else {
            Ok(())
        }
    }

    fn teardown_link(&self, link: Arc<Link>) -> Result<(), TopologyError> {
        let result = self.registry.disconnect_link(&link);
        if let Err(e) = &result {
            debug!("Stopping stats for {} failed: {}", link.id(), e);
        }
        self.presentation.remove_drawable(&Drawable::Link(link));
        result
    }

    /// Apply a statistics reply to `link`
    ///
    /// Replies for the unfiltered match refresh the link's utilization.
    pub fn update_link_stats(&self, link: &Link, m: &Match, reply: &AggregateStatsReply) {
        if link.update_stats(m, reply, Instant::now()) && m.is_wildcard_all() {
            self.presentation
                .link_utilization_changed(link.id(), link.utilization());
        }
    }

    /// Set a link's utilization as computed by the backend
    pub fn set_link_utilization(&self, id: &LinkId, utilization: f64) -> Result<(), TopologyError> {
        let link = self.get_link(id).ok_or(TopologyError::LinkMissing)?;
        link.set_reported_utilization(utilization);
        self.presentation
            .link_utilization_changed(*id, link.utilization());
        Ok(())
    }

    /// Store the description a switch reported; false if the node is unknown
    pub fn set_switch_description(&self, dpid: u64, desc: SwitchDescription) -> bool {
        match self.get_node(dpid) {
            Some(node) => {
                if !node.kind().is_switch() {
                    warn!("Received switch description for non-switch {}", node);
                }
                node.set_description(desc);
                true
            }
            None => false,
        }
    }

    /// Add a flow path
    pub fn add_flow(&self, owner: ConnectionId, flow: Flow) {
        self.flows
            .entry(flow.flow_id)
            .or_insert_with(|| FlowEntry {
                owner,
                flows: Vec::new(),
            })
            .flows
            .push(flow.clone());
        self.presentation.add_drawable(&Drawable::Flow(flow));
    }

    /// Remove every path with flow id `id`; false if there were none
    pub fn remove_flows(&self, id: u32) -> bool {
        match self.flows.remove(&id) {
            Some((_, entry)) => {
                for flow in entry.flows {
                    self.presentation.remove_drawable(&Drawable::Flow(flow));
                }
                true
            }
            None => false,
        }
    }

    /// Paths with flow id `id`
    pub fn get_flows(&self, id: u32) -> Option<Vec<Flow>> {
        self.flows.get(&id).map(|e| e.flows.clone())
    }

    /// Ids of all flows in this view
    pub fn flow_ids(&self) -> Vec<u32> {
        self.flows.iter().map(|f| *f.key()).collect()
    }

    /// Log a message that referred to a node this view lacks
    pub fn log_node_missing(&self, msg: &str, why: &str, id: u64) {
        if !self.is_shutting_down() {
            warn!(
                "Ignoring {} message for non-existent {} node {:#x}",
                msg, why, id
            );
        }
    }

    /// Log a message that referred to a link this view lacks
    pub fn log_link_missing(&self, msg: &str, id: &LinkId) {
        if !self.is_shutting_down() {
            warn!("Ignoring {} message for non-existent link {}", msg, id);
        }
    }
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("nodes", &self.nodes.len())
            .field("flows", &self.flows.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use ofg_wire::{LinkRecord, LinkType, NodeRecord, NodeType};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        added: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    fn describe(d: &Drawable) -> String {
        match d {
            Drawable::Node(n) => format!("node {}", n.id()),
            Drawable::Link(l) => format!("link {}", l.id()),
            Drawable::Flow(f) => format!("flow {}", f.flow_id),
        }
    }

    impl Presentation for Recorder {
        fn add_drawable(&self, drawable: &Drawable) {
            self.added.lock().push(describe(drawable));
        }
        fn remove_drawable(&self, drawable: &Drawable) {
            self.removed.lock().push(describe(drawable));
        }
        fn link_utilization_changed(&self, _link: LinkId, _utilization: f64) {}
        fn extension_received(&self, _msg: &Message) {}
    }

    const A: ConnectionId = ConnectionId(1);
    const B: ConnectionId = ConnectionId(2);

    fn switch(id: u64) -> Node {
        Node::new(id, NodeKind::Switch)
    }

    fn link_spec(src: u64, src_port: u16, dst: u64, dst_port: u16) -> LinkSpec {
        LinkSpec {
            link: LinkRecord {
                link_type: LinkType::Wire,
                src: NodeRecord::new(NodeType::OpenflowSwitch, src),
                src_port,
                dst: NodeRecord::new(NodeType::OpenflowSwitch, dst),
                dst_port,
            },
            capacity_bps: 0,
        }
    }

    fn view(registry: &Arc<GlobalRegistry>) -> (Topology, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Topology::new(Arc::clone(registry), recorder.clone()),
            recorder,
        )
    }

    #[test]
    fn test_refcount_across_views() {
        let registry = Arc::new(GlobalRegistry::new());
        let (view1, rec1) = view(&registry);
        let (view2, rec2) = view(&registry);

        assert!(view1.add_node(A, switch(5)));
        let second = view2.add_node_detailed(B, switch(5));
        assert_eq!(
            second,
            AddOutcome {
                local_new: true,
                global_new: false
            }
        );
        assert_eq!(rec1.added.lock().as_slice(), ["node 5"]);
        assert_eq!(rec2.added.lock().as_slice(), ["node 5"]);

        assert_eq!(view1.remove_node(A, 5), RemoveStatus::RemovedLocally);
        assert!(view1.get_node(5).is_none());
        assert!(view2.global_get_node(5).is_some());
        assert_eq!(rec1.removed.lock().as_slice(), ["node 5"]);
        assert!(rec2.removed.lock().is_empty());

        assert_eq!(view2.remove_node(B, 5), RemoveStatus::RemovedGlobally);
        assert!(registry.get(5).is_none());
        assert_eq!(rec2.removed.lock().as_slice(), ["node 5"]);
        assert_eq!(rec1.removed.lock().len(), 1);
        assert_eq!(view2.remove_node(B, 5), RemoveStatus::NotPresent);
    }

    #[test]
    fn test_shared_node_drawn_once_per_view() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, rec) = view(&registry);

        topo.add_node(A, switch(1));
        topo.add_node(B, switch(1));
        assert_eq!(rec.added.lock().len(), 1);

        assert_eq!(topo.remove_node(A, 1), RemoveStatus::StillReferencedLocally);
        assert!(rec.removed.lock().is_empty());
        assert_eq!(topo.remove_node(B, 1), RemoveStatus::RemovedGlobally);
        assert_eq!(rec.removed.lock().as_slice(), ["node 1"]);
    }

    #[test]
    fn test_concurrent_add_remove_keeps_owned_node() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..2000 {
                    topo.add_node(A, switch(5));
                    topo.remove_node(A, 5);
                }
            });
            s.spawn(|| {
                for _ in 0..2000 {
                    topo.add_node(B, switch(5));
                    assert!(topo.has_node(5), "owned node missing from view");
                    assert!(registry.get(5).is_some(), "owned node missing globally");
                    topo.remove_node(B, 5);
                }
            });
        });

        assert!(!topo.has_node(5));
        assert!(registry.get(5).is_none());
    }

    #[test]
    fn test_two_owners_one_view() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);

        assert!(topo.add_node(A, switch(1)));
        assert_eq!(
            topo.add_node_detailed(B, switch(1)),
            AddOutcome {
                local_new: false,
                global_new: false
            }
        );
        assert_eq!(topo.remove_node(A, 1), RemoveStatus::StillReferencedLocally);
        assert_eq!(topo.remove_node(B, 1), RemoveStatus::RemovedGlobally);
    }

    #[test]
    fn test_add_link_requires_endpoints() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);

        assert!(matches!(
            topo.add_link(A, &link_spec(1, 1, 2, 1)),
            Err(TopologyError::SourceMissing(1))
        ));
        topo.add_node(A, switch(1));
        assert!(matches!(
            topo.add_link(A, &link_spec(1, 1, 2, 1)),
            Err(TopologyError::DestinationMissing(2))
        ));
        topo.add_node(A, switch(2));

        let link = topo.add_link(A, &link_spec(1, 1, 2, 1)).unwrap();
        assert_eq!(link.max_data_rate_bps(), crate::link::DEFAULT_MAX_DATA_RATE_BPS);
        assert!(matches!(
            topo.add_link(A, &link_spec(1, 1, 2, 1)),
            Err(TopologyError::LinkAlreadyExists(_))
        ));
    }

    #[test]
    fn test_disconnect_link_errors() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);
        topo.add_node(A, switch(1));
        topo.add_node(A, switch(2));

        assert!(matches!(
            topo.disconnect_link(A, 9, 1, 2, 1),
            Err(TopologyError::SourceMissing(9))
        ));
        assert!(matches!(
            topo.disconnect_link(A, 1, 1, 9, 1),
            Err(TopologyError::DestinationMissing(9))
        ));
        assert!(matches!(
            topo.disconnect_link(A, 1, 1, 2, 1),
            Err(TopologyError::LinkMissing)
        ));
    }

    #[test]
    fn test_link_survives_until_last_owner() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, rec) = view(&registry);
        for owner in [A, B] {
            topo.add_node(owner, switch(1));
            topo.add_node(owner, switch(2));
        }
        topo.add_link(A, &link_spec(1, 1, 2, 1)).unwrap();
        assert!(topo.add_link(B, &link_spec(1, 1, 2, 1)).is_err());

        topo.disconnect_link(A, 1, 1, 2, 1).unwrap();
        assert_eq!(registry.links().len(), 1);
        topo.disconnect_link(B, 1, 1, 2, 1).unwrap();
        assert!(registry.links().is_empty());
        assert_eq!(rec.removed.lock().as_slice(), ["link 0x1:1 -> 0x2:1"]);
    }

    #[test]
    fn test_global_removal_disconnects_links() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);
        topo.add_node(A, switch(1));
        topo.add_node(A, switch(2));
        topo.add_link(A, &link_spec(1, 1, 2, 1)).unwrap();

        assert_eq!(topo.remove_node(A, 1), RemoveStatus::RemovedGlobally);
        assert!(registry.links().is_empty());
        assert!(topo.get_node(2).unwrap().link_ids().is_empty());
    }

    #[test]
    fn test_remove_all_only_touches_owner() {
        let registry = Arc::new(GlobalRegistry::new());
        let (topo, _) = view(&registry);
        topo.add_node(A, switch(1));
        topo.add_node(A, switch(2));
        topo.add_node(B, switch(3));
        topo.add_link(A, &link_spec(1, 1, 2, 1)).unwrap();
        topo.add_flow(
            A,
            Flow {
                flow_type: 0,
                flow_id: 7,
                src: NodeRecord::new(NodeType::OpenflowSwitch, 1),
                src_port: 1,
                dst: NodeRecord::new(NodeType::OpenflowSwitch, 2),
                dst_port: 1,
                path: Default::default(),
            },
        );

        topo.remove_all(A);
        assert_eq!(topo.get_node_ids(), vec![3]);
        assert!(registry.links().is_empty());
        assert!(topo.flow_ids().is_empty());
        assert!(registry.get(1).is_none());
        assert!(registry.get(3).is_some());
    }
}
