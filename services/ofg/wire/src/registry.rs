//! Type registry: maps a header's type code to the body decoder.
//!
//! [`decode`] is what a client uses: it refuses message types that only
//! ever travel from the client to the backend. [`decode_any`] skips that
//! check and is used for nested messages (the inner request of a poll)
//! and by tools that speak the backend side of the protocol.

use bytes::{Buf, Bytes};

use crate::auth::{AuthReply, AuthRequest, AuthStatus};
use crate::codec::{decode_list, ensure, get_u16, get_u32};
use crate::ext::{LinkFailure, PowerComparison, PowerUsage, SwitchFailure, TrafficMatrix};
use crate::flow::decode_flows;
use crate::header::{Header, MessageType};
use crate::message::{Message, Payload, PollStart};
use crate::request::{LinksRequest, Request};
use crate::stats::{StatsReply, StatsRequest};
use crate::WireError;

/// Decode a client-bound message body, rejecting send-only types
pub fn decode(header: &Header, body: Bytes) -> Result<Message, WireError> {
    if !header.typ.is_client_bound() {
        return Err(WireError::UnexpectedType(header.typ));
    }
    decode_any(header, body)
}

/// Decode any message body regardless of direction
///
/// `body` must hold exactly the bytes following the header. The whole body
/// must be consumed; leftovers are an error.
pub fn decode_any(header: &Header, mut body: Bytes) -> Result<Message, WireError> {
    let payload = decode_payload(header.typ, &mut body)?;
    if body.has_remaining() {
        return Err(WireError::TrailingBytes(body.remaining()));
    }
    Ok(Message::with_xid(header.xid, payload))
}

/// Decode one complete message (header and body) from the front of `buf`
pub fn decode_message(buf: &mut Bytes) -> Result<Message, WireError> {
    let header = Header::decode(buf)?;
    ensure(buf, header.body_len())?;
    let body = buf.split_to(header.body_len());
    decode_any(&header, body)
}

fn decode_payload(typ: MessageType, body: &mut Bytes) -> Result<Payload, WireError> {
    let payload = match typ {
        MessageType::Disconnect => Payload::Disconnect,
        MessageType::AuthRequest => Payload::AuthRequest(AuthRequest::decode(body)?),
        MessageType::AuthReply => Payload::AuthReply(AuthReply::decode(body)?),
        MessageType::AuthStatus => Payload::AuthStatus(AuthStatus::decode(body)?),
        MessageType::EchoRequest => Payload::EchoRequest,
        MessageType::EchoReply => Payload::EchoReply,
        MessageType::PollStart => {
            let interval = get_u16(body)?;
            let mut rest = body.split_to(body.len());
            let inner = decode_message(&mut rest)?;
            if rest.has_remaining() {
                return Err(WireError::TrailingBytes(rest.remaining()));
            }
            Payload::PollStart(PollStart {
                interval,
                inner: Box::new(inner),
            })
        }
        MessageType::PollStop => Payload::PollStop(get_u32(body)?),
        MessageType::NodesRequest => Payload::NodesRequest(Request::decode(body)?),
        MessageType::NodesAdd => Payload::NodesAdd(decode_list(body)?),
        MessageType::NodesDelete => Payload::NodesDelete(decode_list(body)?),
        MessageType::LinksRequest => Payload::LinksRequest(LinksRequest::decode(body)?),
        MessageType::LinksAdd => Payload::LinksAdd(decode_list(body)?),
        MessageType::LinksDelete => Payload::LinksDelete(decode_list(body)?),
        MessageType::FlowsRequest => Payload::FlowsRequest(Request::decode(body)?),
        MessageType::FlowsAdd => Payload::FlowsAdd(decode_flows(body)?),
        MessageType::FlowsDelete => Payload::FlowsDelete(decode_flows(body)?),
        MessageType::StatRequest => Payload::StatRequest(StatsRequest::decode(body)?),
        MessageType::StatReply => Payload::StatReply(StatsReply::decode(body)?),
        MessageType::ExPowerUsage => Payload::ExPowerUsage(PowerUsage::decode(body)?),
        MessageType::EtLinkUtils => Payload::EtLinkUtils(decode_list(body)?),
        MessageType::EtPowerUsage => Payload::EtPowerUsage(PowerComparison::decode(body)?),
        MessageType::EtSwitchesOff => Payload::EtSwitchesOff(decode_list(body)?),
        MessageType::EtBandwidth => Payload::EtBandwidth(get_u32(body)?),
        MessageType::EtLatency => Payload::EtLatency(get_u32(body)?),
        MessageType::EtSwitchesRequest => Payload::EtSwitchesRequest(get_u32(body)?),
        MessageType::EtSwitchFailures => Payload::EtSwitchFailures(SwitchFailure::decode(body)?),
        MessageType::EtLinkFailures => Payload::EtLinkFailures(LinkFailure::decode(body)?),
        MessageType::EtTrafficMatrix => Payload::EtTrafficMatrix(TrafficMatrix::decode(body)?),
        MessageType::EtComputationDone => Payload::EtComputationDone(get_u32(body)?),
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthType;
    use crate::ext::LinkUtil;
    use crate::flow::{Flow, FlowHop};
    use crate::request::RequestType;
    use crate::stats::{
        AggregateStatsReply, AggregateStatsRequest, Match, StatsHeader, StatsType,
        SwitchDescription,
    };
    use crate::topology::{LinkRecord, LinkSpec, LinkType, NodeRecord, NodeType};
    use bytes::BytesMut;
    use smallvec::smallvec;

    fn switch(id: u64) -> NodeRecord {
        NodeRecord::new(NodeType::OpenflowSwitch, id)
    }

    fn link(src: u64, src_port: u16, dst: u64, dst_port: u16) -> LinkRecord {
        LinkRecord {
            link_type: LinkType::Wire,
            src: switch(src),
            src_port,
            dst: switch(dst),
            dst_port,
        }
    }

    fn roundtrip(msg: Message) {
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), msg.length(), "length() for {:?}", msg.message_type());

        let mut buf = bytes.clone();
        let decoded = decode_message(&mut buf).unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_every_type() {
        let agg = Message::with_xid(
            42,
            Payload::StatRequest(StatsRequest::Aggregate(AggregateStatsRequest::new(
                1,
                2,
                Match::all(),
            ))),
        );

        let samples = vec![
            Message::new(Payload::Disconnect),
            Message::with_xid(
                3,
                Payload::AuthRequest(AuthRequest {
                    auth_type: AuthType::PlainText,
                    salt: Bytes::from_static(&[9; 20]),
                }),
            ),
            Message::with_xid(3, Payload::AuthReply(AuthReply::new("user", "pw"))),
            Message::new(Payload::AuthStatus(AuthStatus {
                ok: false,
                message: "bad password".into(),
            })),
            Message::with_xid(11, Payload::EchoRequest),
            Message::with_xid(11, Payload::EchoReply),
            Message::with_xid(
                5,
                Payload::PollStart(PollStart {
                    interval: 10,
                    inner: Box::new(agg.clone()),
                }),
            ),
            Message::new(Payload::PollStop(42)),
            Message::new(Payload::NodesRequest(Request::nodes(RequestType::Subscribe))),
            Message::new(Payload::NodesAdd(vec![switch(1), NodeRecord::new(NodeType::Host, 9)])),
            Message::new(Payload::NodesDelete(vec![switch(1)])),
            Message::new(Payload::LinksRequest(LinksRequest::from_node(
                RequestType::OneTime,
                switch(1),
            ))),
            Message::new(Payload::LinksAdd(vec![LinkSpec {
                link: link(1, 1, 2, 2),
                capacity_bps: 100_000_000,
            }])),
            Message::new(Payload::LinksDelete(vec![link(1, 1, 2, 2), link(2, 2, 1, 1)])),
            Message::new(Payload::FlowsRequest(Request::nodes(RequestType::OneTime))),
            Message::new(Payload::FlowsAdd(vec![Flow {
                flow_type: 0,
                flow_id: 1,
                src: switch(1),
                src_port: 1,
                dst: switch(2),
                dst_port: 2,
                path: smallvec![FlowHop {
                    in_port: 1,
                    node: switch(3),
                    out_port: 2
                }],
            }])),
            Message::new(Payload::FlowsDelete(vec![])),
            agg,
            Message::new(Payload::StatRequest(StatsRequest::Description { dpid: 1 })),
            Message::with_xid(
                42,
                Payload::StatReply(StatsReply::Aggregate(AggregateStatsReply {
                    dpid: 1,
                    flags: 0,
                    packet_count: 10,
                    byte_count: 1500,
                    flow_count: 1,
                })),
            ),
            Message::new(Payload::StatReply(StatsReply::Description {
                dpid: 1,
                flags: 0,
                desc: SwitchDescription {
                    manufacturer: "acme".into(),
                    ..Default::default()
                },
            })),
            Message::new(Payload::StatReply(StatsReply::Other {
                header: StatsHeader::new(1, StatsType::Table),
                body: Bytes::from_static(&[1, 2, 3, 4]),
            })),
            Message::new(Payload::ExPowerUsage(PowerUsage {
                watts_current: 300,
                amps_current: 3,
            })),
            Message::new(Payload::EtLinkUtils(vec![LinkUtil {
                link: link(1, 1, 2, 2),
                util: 0.25,
            }])),
            Message::new(Payload::EtPowerUsage(PowerComparison {
                watts_current: 100,
                watts_traditional: 400,
                watts_max: 500,
            })),
            Message::new(Payload::EtSwitchesOff(vec![switch(4)])),
            Message::new(Payload::EtBandwidth(950)),
            Message::new(Payload::EtLatency(12)),
            Message::new(Payload::EtSwitchesRequest(4)),
            Message::new(Payload::EtSwitchFailures(SwitchFailure {
                dpid: 3,
                failed: true,
            })),
            Message::new(Payload::EtLinkFailures(LinkFailure {
                link: link(1, 1, 2, 2),
                failed: false,
            })),
            Message::new(Payload::EtTrafficMatrix(
                TrafficMatrix::new(false, true, 4, 0.5, 0.25, 0.25, 1500).unwrap(),
            )),
            Message::new(Payload::EtComputationDone(0)),
        ];

        for msg in samples {
            roundtrip(msg);
        }
    }

    #[test]
    fn test_misaligned_node_list() {
        let header = Header {
            length: 7 + 11,
            typ: MessageType::NodesAdd,
            xid: 0,
        };
        let body = Bytes::from(vec![0u8; 11]);
        let err = decode(&header, body).unwrap_err();
        assert_eq!(
            err,
            WireError::Misaligned {
                what: "node",
                body_len: 11,
                element_size: 10
            }
        );
    }

    #[test]
    fn test_send_only_type_rejected() {
        let msg = Message::new(Payload::PollStop(1));
        let mut bytes = msg.encode().unwrap();
        let header = Header::decode(&mut bytes).unwrap();
        assert_eq!(
            decode(&header, bytes).unwrap_err(),
            WireError::UnexpectedType(MessageType::PollStop)
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let header = Header {
            length: 7 + 5,
            typ: MessageType::EtBandwidth,
            xid: 0,
        };
        let body = Bytes::from_static(&[0, 0, 0, 1, 0xEE]);
        assert_eq!(decode(&header, body).unwrap_err(), WireError::TrailingBytes(1));
    }

    #[test]
    fn test_nested_overrun_rejected() {
        // poll whose inner header claims more bytes than the outer body holds
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 1]);
        buf.extend_from_slice(&[0, 30, 0x20, 0, 0, 0, 1]);
        let header = Header {
            length: (7 + buf.len()) as u16,
            typ: MessageType::PollStart,
            xid: 0,
        };
        assert!(matches!(
            decode_any(&header, buf.freeze()),
            Err(WireError::Truncated { .. })
        ));
    }
}
