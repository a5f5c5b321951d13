//! Typed messages.
//!
//! A [`Message`] is a transaction id plus a [`Payload`]; the type code and
//! length in the header are derived from the payload so they can never
//! disagree with what is written.

use bytes::{BufMut, Bytes, BytesMut};

use crate::auth::{AuthReply, AuthRequest, AuthStatus};
use crate::codec::{encode_list, Record};
use crate::ext::{LinkFailure, LinkUtil, PowerComparison, PowerUsage, SwitchFailure, TrafficMatrix};
use crate::flow::{encode_flows, flows_body_len, Flow};
use crate::header::{Header, MessageType, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::request::{LinksRequest, Request};
use crate::stats::{StatsReply, StatsRequest};
use crate::topology::{LinkRecord, LinkSpec, NodeRecord};
use crate::WireError;

/// POLL_START body: the backend resends `inner` every `interval` x 100 ms
#[derive(Debug, Clone, PartialEq)]
pub struct PollStart {
    /// Period in 100 ms units; 0 sends `inner` once
    pub interval: u16,
    /// Complete message to resend, header included
    pub inner: Box<Message>,
}

/// Message body, one variant per message type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Orderly close
    Disconnect,
    /// Authentication challenge
    AuthRequest(AuthRequest),
    /// Authentication answer
    AuthReply(AuthReply),
    /// Authentication verdict
    AuthStatus(AuthStatus),
    /// Liveness probe
    EchoRequest,
    /// Liveness answer
    EchoReply,
    /// Start a backend-side poll
    PollStart(PollStart),
    /// Stop the poll started with this xid
    PollStop(u32),
    /// Ask for nodes
    NodesRequest(Request),
    /// Nodes appeared
    NodesAdd(Vec<NodeRecord>),
    /// Nodes disappeared
    NodesDelete(Vec<NodeRecord>),
    /// Ask for links
    LinksRequest(LinksRequest),
    /// Links appeared
    LinksAdd(Vec<LinkSpec>),
    /// Links disappeared
    LinksDelete(Vec<LinkRecord>),
    /// Ask for flows
    FlowsRequest(Request),
    /// Flows appeared
    FlowsAdd(Vec<Flow>),
    /// Flows disappeared
    FlowsDelete(Vec<Flow>),
    /// Statistics request
    StatRequest(StatsRequest),
    /// Statistics reply
    StatReply(StatsReply),
    /// Network power draw
    ExPowerUsage(PowerUsage),
    /// Backend-computed link utilizations
    EtLinkUtils(Vec<LinkUtil>),
    /// Power draw compared with an always-on network
    EtPowerUsage(PowerComparison),
    /// Switches currently powered off
    EtSwitchesOff(Vec<NodeRecord>),
    /// Achieved bandwidth in Mbps
    EtBandwidth(u32),
    /// Latency in milliseconds
    EtLatency(u32),
    /// Ask for the switches of a fat tree of size k
    EtSwitchesRequest(u32),
    /// Inject or repair a switch failure
    EtSwitchFailures(SwitchFailure),
    /// Inject or repair a link failure
    EtLinkFailures(LinkFailure),
    /// Traffic matrix to generate
    EtTrafficMatrix(TrafficMatrix),
    /// Flow placement finished; number of flows left unplaced
    EtComputationDone(u32),
}

impl Payload {
    /// Message type this payload encodes as
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Disconnect => MessageType::Disconnect,
            Payload::AuthRequest(_) => MessageType::AuthRequest,
            Payload::AuthReply(_) => MessageType::AuthReply,
            Payload::AuthStatus(_) => MessageType::AuthStatus,
            Payload::EchoRequest => MessageType::EchoRequest,
            Payload::EchoReply => MessageType::EchoReply,
            Payload::PollStart(_) => MessageType::PollStart,
            Payload::PollStop(_) => MessageType::PollStop,
            Payload::NodesRequest(_) => MessageType::NodesRequest,
            Payload::NodesAdd(_) => MessageType::NodesAdd,
            Payload::NodesDelete(_) => MessageType::NodesDelete,
            Payload::LinksRequest(_) => MessageType::LinksRequest,
            Payload::LinksAdd(_) => MessageType::LinksAdd,
            Payload::LinksDelete(_) => MessageType::LinksDelete,
            Payload::FlowsRequest(_) => MessageType::FlowsRequest,
            Payload::FlowsAdd(_) => MessageType::FlowsAdd,
            Payload::FlowsDelete(_) => MessageType::FlowsDelete,
            Payload::StatRequest(_) => MessageType::StatRequest,
            Payload::StatReply(_) => MessageType::StatReply,
            Payload::ExPowerUsage(_) => MessageType::ExPowerUsage,
            Payload::EtLinkUtils(_) => MessageType::EtLinkUtils,
            Payload::EtPowerUsage(_) => MessageType::EtPowerUsage,
            Payload::EtSwitchesOff(_) => MessageType::EtSwitchesOff,
            Payload::EtBandwidth(_) => MessageType::EtBandwidth,
            Payload::EtLatency(_) => MessageType::EtLatency,
            Payload::EtSwitchesRequest(_) => MessageType::EtSwitchesRequest,
            Payload::EtSwitchFailures(_) => MessageType::EtSwitchFailures,
            Payload::EtLinkFailures(_) => MessageType::EtLinkFailures,
            Payload::EtTrafficMatrix(_) => MessageType::EtTrafficMatrix,
            Payload::EtComputationDone(_) => MessageType::EtComputationDone,
        }
    }

    /// Number of body bytes `write_body` emits
    pub fn body_len(&self) -> usize {
        match self {
            Payload::Disconnect | Payload::EchoRequest | Payload::EchoReply => 0,
            Payload::AuthRequest(req) => req.body_len(),
            Payload::AuthReply(reply) => reply.body_len(),
            Payload::AuthStatus(status) => status.body_len(),
            Payload::PollStart(poll) => 2 + poll.inner.length(),
            Payload::PollStop(_) => 4,
            Payload::NodesRequest(_) | Payload::FlowsRequest(_) => Request::SIZE,
            Payload::LinksRequest(_) => LinksRequest::SIZE,
            Payload::NodesAdd(nodes)
            | Payload::NodesDelete(nodes)
            | Payload::EtSwitchesOff(nodes) => nodes.len() * NodeRecord::SIZE,
            Payload::LinksAdd(specs) => specs.len() * LinkSpec::SIZE,
            Payload::LinksDelete(links) => links.len() * LinkRecord::SIZE,
            Payload::FlowsAdd(flows) | Payload::FlowsDelete(flows) => flows_body_len(flows),
            Payload::StatRequest(req) => req.body_len(),
            Payload::StatReply(reply) => reply.body_len(),
            Payload::ExPowerUsage(_) => PowerUsage::SIZE,
            Payload::EtLinkUtils(utils) => utils.len() * LinkUtil::SIZE,
            Payload::EtPowerUsage(_) => PowerComparison::SIZE,
            Payload::EtBandwidth(_)
            | Payload::EtLatency(_)
            | Payload::EtSwitchesRequest(_)
            | Payload::EtComputationDone(_) => 4,
            Payload::EtSwitchFailures(_) => SwitchFailure::SIZE,
            Payload::EtLinkFailures(_) => LinkFailure::SIZE,
            Payload::EtTrafficMatrix(_) => TrafficMatrix::SIZE,
        }
    }

    /// Append the body to `buf`
    pub fn write_body(&self, buf: &mut BytesMut) {
        match self {
            Payload::Disconnect | Payload::EchoRequest | Payload::EchoReply => {}
            Payload::AuthRequest(req) => req.encode(buf),
            Payload::AuthReply(reply) => reply.encode(buf),
            Payload::AuthStatus(status) => status.encode(buf),
            Payload::PollStart(poll) => {
                buf.put_u16(poll.interval);
                poll.inner.write(buf);
            }
            Payload::PollStop(xid) => buf.put_u32(*xid),
            Payload::NodesRequest(req) | Payload::FlowsRequest(req) => req.encode(buf),
            Payload::LinksRequest(req) => req.encode(buf),
            Payload::NodesAdd(nodes)
            | Payload::NodesDelete(nodes)
            | Payload::EtSwitchesOff(nodes) => encode_list(nodes, buf),
            Payload::LinksAdd(specs) => encode_list(specs, buf),
            Payload::LinksDelete(links) => encode_list(links, buf),
            Payload::FlowsAdd(flows) | Payload::FlowsDelete(flows) => encode_flows(flows, buf),
            Payload::StatRequest(req) => req.encode(buf),
            Payload::StatReply(reply) => reply.encode(buf),
            Payload::ExPowerUsage(usage) => usage.encode(buf),
            Payload::EtLinkUtils(utils) => encode_list(utils, buf),
            Payload::EtPowerUsage(usage) => usage.encode(buf),
            Payload::EtBandwidth(v)
            | Payload::EtLatency(v)
            | Payload::EtSwitchesRequest(v)
            | Payload::EtComputationDone(v) => buf.put_u32(*v),
            Payload::EtSwitchFailures(failure) => failure.encode(buf),
            Payload::EtLinkFailures(failure) => failure.encode(buf),
            Payload::EtTrafficMatrix(tm) => tm.encode(buf),
        }
    }
}

/// A complete protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Transaction id; 0 means no reply is correlated (the connection
    /// assigns one on send)
    pub xid: u32,
    /// Typed body
    pub payload: Payload,
}

impl Message {
    /// Message with xid 0
    pub fn new(payload: Payload) -> Self {
        Self { xid: 0, payload }
    }

    /// Message with an explicit xid (replies echo the request's xid)
    pub fn with_xid(xid: u32, payload: Payload) -> Self {
        Self { xid, payload }
    }

    /// Type code
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Total encoded length, header included
    pub fn length(&self) -> usize {
        HEADER_SIZE + self.payload.body_len()
    }

    /// Header that `write` emits
    pub fn header(&self) -> Header {
        Header {
            length: self.length().min(MAX_MESSAGE_SIZE) as u16,
            typ: self.message_type(),
            xid: self.xid,
        }
    }

    /// Serialize header and body into `buf`
    pub fn write(&self, buf: &mut BytesMut) {
        self.header().encode(buf);
        self.payload.write_body(buf);
    }

    /// Serialize into a standalone buffer, rejecting bodies too large for
    /// the u16 length field
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let length = self.length();
        if length > MAX_MESSAGE_SIZE {
            return Err(WireError::BodyTooLarge(length));
        }
        let mut buf = BytesMut::with_capacity(length);
        self.write(&mut buf);
        Ok(buf.freeze())
    }

    /// Whether the reply to this message must be correlated by xid
    pub fn is_stateful(&self) -> bool {
        match &self.payload {
            Payload::StatRequest(req) => req.is_stateful(),
            Payload::PollStart(poll) => poll.inner.is_stateful(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestType;
    use crate::stats::{AggregateStatsRequest, Match};
    use crate::topology::NodeType;

    #[test]
    fn test_length_matches_written() {
        let msg = Message::with_xid(
            7,
            Payload::NodesAdd(vec![
                NodeRecord::new(NodeType::OpenflowSwitch, 1),
                NodeRecord::new(NodeType::Host, 2),
            ]),
        );
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), msg.length());
        assert_eq!(msg.length(), 7 + 20);
        assert_eq!(&bytes[..7], &[0, 27, 0x11, 0, 0, 0, 7]);
    }

    #[test]
    fn test_stateful() {
        let agg = Message::new(Payload::StatRequest(StatsRequest::Aggregate(
            AggregateStatsRequest::new(1, 2, Match::all()),
        )));
        assert!(agg.is_stateful());

        let desc = Message::new(Payload::StatRequest(StatsRequest::Description { dpid: 1 }));
        assert!(!desc.is_stateful());

        let poll = Message::new(Payload::PollStart(PollStart {
            interval: 10,
            inner: Box::new(agg),
        }));
        assert!(poll.is_stateful());

        let nodes = Message::new(Payload::NodesRequest(Request::nodes(RequestType::OneTime)));
        assert!(!nodes.is_stateful());
    }

    #[test]
    fn test_oversized_body_rejected() {
        let nodes = vec![NodeRecord::new(NodeType::Host, 0); 7000];
        let msg = Message::new(Payload::NodesAdd(nodes));
        assert!(matches!(msg.encode(), Err(WireError::BodyTooLarge(_))));
    }
}
