//! Node and link records carried by the topology messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::Record;

/// Kind of node announced by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Unspecified; also used as the "any type" wildcard in requests
    Unknown,
    /// OpenFlow switch
    OpenflowSwitch,
    /// OpenFlow wireless access point
    OpenflowWirelessAccessPoint,
    /// Hardware processing module
    ModuleHw,
    /// Software processing module
    ModuleSw,
    /// Wired end host
    Host,
    /// Wireless end host
    WirelessHost,
    /// Code this client has no name for; preserved verbatim
    Other(u16),
}

impl NodeType {
    /// Wire code of this type
    pub fn code(self) -> u16 {
        match self {
            NodeType::Unknown => 0,
            NodeType::OpenflowSwitch => 1,
            NodeType::OpenflowWirelessAccessPoint => 2,
            NodeType::ModuleHw => 3,
            NodeType::ModuleSw => 4,
            NodeType::Host => 100,
            NodeType::WirelessHost => 101,
            NodeType::Other(code) => code,
        }
    }
}

impl From<u16> for NodeType {
    fn from(code: u16) -> Self {
        match code {
            0 => NodeType::Unknown,
            1 => NodeType::OpenflowSwitch,
            2 => NodeType::OpenflowWirelessAccessPoint,
            3 => NodeType::ModuleHw,
            4 => NodeType::ModuleSw,
            100 => NodeType::Host,
            101 => NodeType::WirelessHost,
            other => NodeType::Other(other),
        }
    }
}

/// Kind of link announced by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Unspecified; also the "any type" wildcard in requests
    Unknown,
    /// Wired link
    Wire,
    /// Wireless link
    Wireless,
    /// Tunnel
    Tunnel,
    /// Unnamed code, preserved verbatim
    Other(u16),
}

impl LinkType {
    /// Wire code of this type
    pub fn code(self) -> u16 {
        match self {
            LinkType::Unknown => 0,
            LinkType::Wire => 1,
            LinkType::Wireless => 2,
            LinkType::Tunnel => 4,
            LinkType::Other(code) => code,
        }
    }
}

impl From<u16> for LinkType {
    fn from(code: u16) -> Self {
        match code {
            0 => LinkType::Unknown,
            1 => LinkType::Wire,
            2 => LinkType::Wireless,
            4 => LinkType::Tunnel,
            other => LinkType::Other(other),
        }
    }
}

/// Node record: `u16 node_type`, `u64 id` (10 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node kind
    pub node_type: NodeType,
    /// Datapath id for switches, backend-assigned id otherwise
    pub id: u64,
}

impl NodeRecord {
    /// Wildcard node used by link requests that are not node-specific
    pub const ANY: NodeRecord = NodeRecord {
        node_type: NodeType::Unknown,
        id: 0,
    };

    /// Create a node record
    pub fn new(node_type: NodeType, id: u64) -> Self {
        Self { node_type, id }
    }
}

impl Record for NodeRecord {
    const SIZE: usize = 10;
    const NAME: &'static str = "node";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.node_type.code());
        buf.put_u64(self.id);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let node_type = NodeType::from(buf.get_u16());
        let id = buf.get_u64();
        Self { node_type, id }
    }
}

/// Link record: `u16 link_type`, src node, `u16 src_port`, dst node, `u16 dst_port` (26 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Link kind
    pub link_type: LinkType,
    /// Source endpoint
    pub src: NodeRecord,
    /// Port on the source endpoint
    pub src_port: u16,
    /// Destination endpoint
    pub dst: NodeRecord,
    /// Port on the destination endpoint
    pub dst_port: u16,
}

impl Record for LinkRecord {
    const SIZE: usize = 2 + 2 * (NodeRecord::SIZE + 2);
    const NAME: &'static str = "link";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.link_type.code());
        self.src.encode(buf);
        buf.put_u16(self.src_port);
        self.dst.encode(buf);
        buf.put_u16(self.dst_port);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let link_type = LinkType::from(buf.get_u16());
        let src = NodeRecord::decode_unchecked(buf);
        let src_port = buf.get_u16();
        let dst = NodeRecord::decode_unchecked(buf);
        let dst_port = buf.get_u16();
        Self {
            link_type,
            src,
            src_port,
            dst,
            dst_port,
        }
    }
}

/// Link record plus its capacity (34 bytes); carried by LINKS_ADD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSpec {
    /// The link itself
    pub link: LinkRecord,
    /// Capacity in bits per second (0 when unknown)
    pub capacity_bps: u64,
}

impl Record for LinkSpec {
    const SIZE: usize = LinkRecord::SIZE + 8;
    const NAME: &'static str = "link spec";

    fn encode(&self, buf: &mut BytesMut) {
        self.link.encode(buf);
        buf.put_u64(self.capacity_bps);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let link = LinkRecord::decode_unchecked(buf);
        let capacity_bps = buf.get_u64();
        Self { link, capacity_bps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_layout() {
        let node = NodeRecord::new(NodeType::OpenflowSwitch, 0x0102030405060708);
        let mut buf = BytesMut::new();
        node.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 1, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_unknown_codes_preserved() {
        assert_eq!(NodeType::from(77), NodeType::Other(77));
        assert_eq!(NodeType::Other(77).code(), 77);
        assert_eq!(LinkType::from(3).code(), 3);
    }

    #[test]
    fn test_link_spec_roundtrip() {
        let spec = LinkSpec {
            link: LinkRecord {
                link_type: LinkType::Wire,
                src: NodeRecord::new(NodeType::OpenflowSwitch, 1),
                src_port: 3,
                dst: NodeRecord::new(NodeType::Host, 0xAA),
                dst_port: 0,
            },
            capacity_bps: 1_000_000_000,
        };

        let mut buf = BytesMut::new();
        spec.encode(&mut buf);
        assert_eq!(buf.len(), LinkSpec::SIZE);
        assert_eq!(LinkSpec::SIZE, 34);

        let mut bytes = buf.freeze();
        assert_eq!(LinkSpec::decode(&mut bytes).unwrap(), spec);
    }
}
