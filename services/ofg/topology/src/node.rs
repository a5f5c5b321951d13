//! Topology nodes and their port adjacency.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use ofg_wire::{NodeType, SwitchDescription};
use parking_lot::RwLock;

use crate::link::LinkId;

/// What a node is, as far as the viewer cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// OpenFlow switch
    Switch,
    /// OpenFlow wireless access point
    AccessPoint,
    /// Wired end host
    Host,
    /// Wireless end host
    WirelessHost,
    /// Packet processing module
    Module {
        /// Hardware (true) or software (false) implementation
        hardware: bool,
    },
    /// Anything else the backend announces
    Unknown,
}

impl NodeKind {
    /// Whether this node speaks OpenFlow and answers statistics requests
    pub fn is_switch(self) -> bool {
        matches!(self, NodeKind::Switch | NodeKind::AccessPoint)
    }
}

impl From<NodeType> for NodeKind {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::OpenflowSwitch => NodeKind::Switch,
            NodeType::OpenflowWirelessAccessPoint => NodeKind::AccessPoint,
            NodeType::Host => NodeKind::Host,
            NodeType::WirelessHost => NodeKind::WirelessHost,
            NodeType::ModuleHw => NodeKind::Module { hardware: true },
            NodeType::ModuleSw => NodeKind::Module { hardware: false },
            NodeType::Unknown | NodeType::Other(_) => NodeKind::Unknown,
        }
    }
}

/// Capability of a node that has numbered ports with links attached
pub trait HasPorts {
    /// Every link attached to this node
    fn link_ids(&self) -> Vec<LinkId>;

    /// The link leaving `my_port` and arriving at `dst` on `dst_port`
    fn directed_link_to(&self, my_port: u16, dst: u64, dst_port: u16) -> Option<LinkId>;

    /// The link leaving `port`, or failing that the one arriving on it
    ///
    /// A port carrying both directions of a pair resolves to the outgoing
    /// link, which is the one statistics requests for the port describe.
    fn link_from(&self, port: u16) -> Option<LinkId>;
}

/// A node shared by every view that knows about it
pub struct Node {
    id: u64,
    kind: NodeKind,
    links: RwLock<Vec<LinkId>>,
    description: RwLock<Option<SwitchDescription>>,
    failed: AtomicBool,
    off: AtomicBool,
}

impl Node {
    /// A node with no links
    pub fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            links: RwLock::new(Vec::new()),
            description: RwLock::new(None),
            failed: AtomicBool::new(false),
            off: AtomicBool::new(false),
        }
    }

    /// Datapath id or backend-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Node kind
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Switch description, once the backend has sent one
    pub fn description(&self) -> Option<SwitchDescription> {
        self.description.read().clone()
    }

    pub(crate) fn set_description(&self, desc: SwitchDescription) {
        *self.description.write() = Some(desc);
    }

    /// Whether the node has been reported failed
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mark the node failed or recovered
    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Relaxed);
    }

    /// Whether the node has been powered off
    pub fn is_off(&self) -> bool {
        self.off.load(Ordering::Relaxed)
    }

    /// Mark the node powered off or on
    pub fn set_off(&self, off: bool) {
        self.off.store(off, Ordering::Relaxed);
    }

    pub(crate) fn attach(&self, link: LinkId) {
        let mut links = self.links.write();
        if !links.contains(&link) {
            links.push(link);
        }
    }

    pub(crate) fn detach(&self, link: &LinkId) {
        self.links.write().retain(|l| l != link);
    }
}

impl HasPorts for Node {
    fn link_ids(&self) -> Vec<LinkId> {
        self.links.read().clone()
    }

    fn directed_link_to(&self, my_port: u16, dst: u64, dst_port: u16) -> Option<LinkId> {
        let wanted = LinkId {
            src: self.id,
            src_port: my_port,
            dst,
            dst_port,
        };
        self.links.read().iter().copied().find(|l| *l == wanted)
    }

    fn link_from(&self, port: u16) -> Option<LinkId> {
        let links = self.links.read();
        links
            .iter()
            .copied()
            .find(|l| l.src == self.id && l.src_port == port)
            .or_else(|| {
                links
                    .iter()
                    .copied()
                    .find(|l| l.dst == self.id && l.dst_port == port)
            })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &format_args!("{:#x}", self.id))
            .field("kind", &self.kind)
            .field("links", &self.links.read().len())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:#x}", self.kind, self.id)
    }
}
