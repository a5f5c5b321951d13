//! Flow paths reported by the backend.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::codec::{ensure, get_u32, Record};
use crate::topology::NodeRecord;
use crate::WireError;

/// One hop of a flow path: `u16 in_port`, node, `u16 out_port` (14 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowHop {
    /// Port the flow enters on
    pub in_port: u16,
    /// Node traversed
    pub node: NodeRecord,
    /// Port the flow leaves on
    pub out_port: u16,
}

impl Record for FlowHop {
    const SIZE: usize = 2 + NodeRecord::SIZE + 2;
    const NAME: &'static str = "flow hop";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.in_port);
        self.node.encode(buf);
        buf.put_u16(self.out_port);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let in_port = buf.get_u16();
        let node = NodeRecord::decode_unchecked(buf);
        let out_port = buf.get_u16();
        Self {
            in_port,
            node,
            out_port,
        }
    }
}

/// A flow and the path it takes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flow {
    /// Flow type (0 = unknown)
    pub flow_type: u16,
    /// Backend-assigned flow id
    pub flow_id: u32,
    /// Where the flow starts
    pub src: NodeRecord,
    /// Port at the start
    pub src_port: u16,
    /// Where the flow ends
    pub dst: NodeRecord,
    /// Port at the end
    pub dst_port: u16,
    /// Intermediate hops
    pub path: SmallVec<[FlowHop; 4]>,
}

impl Flow {
    const FIXED_SIZE: usize = 2 + 4 + 2 * (NodeRecord::SIZE + 2) + 2;

    /// Encoded size of this flow
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.path.len() * FlowHop::SIZE
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.flow_type);
        buf.put_u32(self.flow_id);
        self.src.encode(buf);
        buf.put_u16(self.src_port);
        self.dst.encode(buf);
        buf.put_u16(self.dst_port);
        buf.put_u16(self.path.len() as u16);
        for hop in &self.path {
            hop.encode(buf);
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        ensure(buf, Self::FIXED_SIZE)?;
        let flow_type = buf.get_u16();
        let flow_id = buf.get_u32();
        let src = NodeRecord::decode_unchecked(buf);
        let src_port = buf.get_u16();
        let dst = NodeRecord::decode_unchecked(buf);
        let dst_port = buf.get_u16();
        let num_hops = buf.get_u16() as usize;

        ensure(buf, num_hops * FlowHop::SIZE)?;
        let path = (0..num_hops)
            .map(|_| FlowHop::decode_unchecked(buf))
            .collect();

        Ok(Self {
            flow_type,
            flow_id,
            src,
            src_port,
            dst,
            dst_port,
            path,
        })
    }
}

/// FLOWS_ADD / FLOWS_DELETE body: `u32 count` then the flows
pub(crate) fn flows_body_len(flows: &[Flow]) -> usize {
    4 + flows.iter().map(Flow::encoded_len).sum::<usize>()
}

pub(crate) fn encode_flows(flows: &[Flow], buf: &mut BytesMut) {
    buf.put_u32(flows.len() as u32);
    for flow in flows {
        flow.encode(buf);
    }
}

pub(crate) fn decode_flows(buf: &mut Bytes) -> Result<Vec<Flow>, WireError> {
    let count = get_u32(buf)? as usize;
    // every flow takes at least FIXED_SIZE bytes, so cap the preallocation
    let mut flows = Vec::with_capacity(count.min(buf.len() / Flow::FIXED_SIZE));
    for _ in 0..count {
        flows.push(Flow::decode(buf)?);
    }
    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeType;
    use smallvec::smallvec;

    fn sample_flow() -> Flow {
        let sw = |id| NodeRecord::new(NodeType::OpenflowSwitch, id);
        Flow {
            flow_type: 0,
            flow_id: 42,
            src: NodeRecord::new(NodeType::Host, 0xA),
            src_port: 0,
            dst: NodeRecord::new(NodeType::Host, 0xB),
            dst_port: 0,
            path: smallvec![
                FlowHop { in_port: 1, node: sw(1), out_port: 2 },
                FlowHop { in_port: 3, node: sw(2), out_port: 4 },
            ],
        }
    }

    #[test]
    fn test_flows_roundtrip() {
        let flows = vec![sample_flow()];
        let mut buf = BytesMut::new();
        encode_flows(&flows, &mut buf);
        assert_eq!(buf.len(), flows_body_len(&flows));
        assert_eq!(flows[0].encoded_len(), 32 + 2 * 14);

        let mut bytes = buf.freeze();
        assert_eq!(decode_flows(&mut bytes).unwrap(), flows);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_flow_count_overstated() {
        let flows = vec![sample_flow()];
        let mut buf = BytesMut::new();
        encode_flows(&flows, &mut buf);
        buf[3] = 2;

        let mut bytes = buf.freeze();
        assert!(matches!(
            decode_flows(&mut bytes),
            Err(WireError::Truncated { .. })
        ));
    }
}
