//! Node, link and flow list requests and subscriptions.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{get_u16, get_u8, Record};
use crate::topology::{LinkType, NodeRecord, NodeType};
use crate::WireError;

/// How the backend should answer a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Unspecified
    Unknown,
    /// Send the current state once
    OneTime,
    /// Push changes as they happen
    Subscribe,
    /// Stop pushing changes
    Unsubscribe,
    /// Code this client has no name for
    Other(u8),
}

impl RequestType {
    /// Wire code of this request type
    pub fn code(self) -> u8 {
        match self {
            RequestType::Unknown => 0,
            RequestType::OneTime => 1,
            RequestType::Subscribe => 2,
            RequestType::Unsubscribe => 3,
            RequestType::Other(code) => code,
        }
    }

    /// Subscribe or unsubscribe depending on `on`
    pub fn subscription(on: bool) -> Self {
        if on {
            RequestType::Subscribe
        } else {
            RequestType::Unsubscribe
        }
    }
}

impl From<u8> for RequestType {
    fn from(code: u8) -> Self {
        match code {
            0 => RequestType::Unknown,
            1 => RequestType::OneTime,
            2 => RequestType::Subscribe,
            3 => RequestType::Unsubscribe,
            other => RequestType::Other(other),
        }
    }
}

/// Object type used to mean "any type" in requests
pub const ANY_TYPE: u16 = 0;

/// Request body shared by NODES_REQUEST and FLOWS_REQUEST:
/// `u8 request_type`, `u16 object_type` (3 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    /// How to answer
    pub request_type: RequestType,
    /// Object type filter; [`ANY_TYPE`] for everything
    pub object_type: u16,
}

impl Request {
    /// Encoded body size
    pub const SIZE: usize = 3;

    /// Request for every node of any type
    pub fn nodes(request_type: RequestType) -> Self {
        Self {
            request_type,
            object_type: ANY_TYPE,
        }
    }

    /// Request restricted to one node type
    pub fn nodes_of(request_type: RequestType, node_type: NodeType) -> Self {
        Self {
            request_type,
            object_type: node_type.code(),
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.request_type.code());
        buf.put_u16(self.object_type);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let request_type = RequestType::from(get_u8(buf)?);
        let object_type = get_u16(buf)?;
        Ok(Self {
            request_type,
            object_type,
        })
    }
}

/// LINKS_REQUEST body: a [`Request`] plus the node whose links are wanted (13 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinksRequest {
    /// How to answer
    pub request_type: RequestType,
    /// Link type filter
    pub link_type: LinkType,
    /// Node whose links are requested; [`NodeRecord::ANY`] for all links
    pub src: NodeRecord,
}

impl LinksRequest {
    /// Encoded body size
    pub const SIZE: usize = Request::SIZE + NodeRecord::SIZE;

    /// Links of any type for every node
    pub fn all(request_type: RequestType) -> Self {
        Self {
            request_type,
            link_type: LinkType::Unknown,
            src: NodeRecord::ANY,
        }
    }

    /// Links of any type leaving `src`
    pub fn from_node(request_type: RequestType, src: NodeRecord) -> Self {
        Self {
            request_type,
            link_type: LinkType::Unknown,
            src,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.request_type.code());
        buf.put_u16(self.link_type.code());
        self.src.encode(buf);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let request_type = RequestType::from(get_u8(buf)?);
        let link_type = LinkType::from(get_u16(buf)?);
        let src = NodeRecord::decode(buf)?;
        Ok(Self {
            request_type,
            link_type,
            src,
        })
    }
}

/// Convert a poll period to the wire's 100 ms units, rounding up.
/// Zero means "send once".
pub fn poll_interval_units(period_ms: u64) -> u16 {
    let units = period_ms.div_ceil(100);
    units.min(u16::MAX as u64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_rounding() {
        assert_eq!(poll_interval_units(0), 0);
        assert_eq!(poll_interval_units(1), 1);
        assert_eq!(poll_interval_units(100), 1);
        assert_eq!(poll_interval_units(250), 3);
        assert_eq!(poll_interval_units(u64::MAX), u16::MAX);
    }

    #[test]
    fn test_links_request_layout() {
        let req = LinksRequest::from_node(
            RequestType::OneTime,
            NodeRecord::new(NodeType::OpenflowSwitch, 1),
        );
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        assert_eq!(buf.len(), LinksRequest::SIZE);
        assert_eq!(&buf[..3], &[1, 0, 0]);

        let mut bytes = buf.freeze();
        assert_eq!(LinksRequest::decode(&mut bytes).unwrap(), req);
    }

    #[test]
    fn test_subscription_helper() {
        assert_eq!(RequestType::subscription(true), RequestType::Subscribe);
        assert_eq!(RequestType::subscription(false), RequestType::Unsubscribe);
        assert_eq!(RequestType::from(9), RequestType::Other(9));
    }
}
