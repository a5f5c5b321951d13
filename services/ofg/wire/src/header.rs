//! Fixed message header and message type codes.
//!
//! Every message starts with the same 7-byte header:
//!
//! ```text
//! +------------+---------+-------------+
//! | u16 length | u8 type | u32 xid     |
//! +------------+---------+-------------+
//! ```
//!
//! `length` counts the whole message, header included.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::WireError;

/// Header size in bytes
pub const HEADER_SIZE: usize = 7;

/// Largest encodable message (the length field is a u16)
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Message types as defined in the wire protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Orderly close of the connection
    Disconnect = 0x00,
    /// Backend asks the client to authenticate
    AuthRequest = 0x01,
    /// Client credentials
    AuthReply = 0x02,
    /// Backend verdict on the credentials
    AuthStatus = 0x03,
    /// Liveness probe
    EchoRequest = 0x08,
    /// Liveness answer
    EchoReply = 0x09,
    /// Ask the backend to resend a request periodically
    PollStart = 0x0E,
    /// Cancel a poll started with `PollStart`
    PollStop = 0x0F,
    /// Request the node list
    NodesRequest = 0x10,
    /// Nodes appeared
    NodesAdd = 0x11,
    /// Nodes disappeared
    NodesDelete = 0x12,
    /// Request the link list
    LinksRequest = 0x13,
    /// Links appeared
    LinksAdd = 0x14,
    /// Links disappeared
    LinksDelete = 0x15,
    /// Request the flow list
    FlowsRequest = 0x16,
    /// Flows appeared
    FlowsAdd = 0x17,
    /// Flows disappeared
    FlowsDelete = 0x18,
    /// Switch statistics request
    StatRequest = 0x20,
    /// Switch statistics reply
    StatReply = 0x21,
    /// Power draw of the network
    ExPowerUsage = 0xF0,
    /// Per-link utilization computed by the backend
    EtLinkUtils = 0xF1,
    /// Power draw compared to a traditional network
    EtPowerUsage = 0xF2,
    /// Switches the backend powered off
    EtSwitchesOff = 0xF3,
    /// Achieved bandwidth
    EtBandwidth = 0xF4,
    /// Path latency
    EtLatency = 0xF5,
    /// Ask for the switch set of a fat tree of size k
    EtSwitchesRequest = 0xF6,
    /// Inject or repair a switch failure
    EtSwitchFailures = 0xF7,
    /// Inject or repair a link failure
    EtLinkFailures = 0xF8,
    /// Traffic matrix the backend should generate
    EtTrafficMatrix = 0xF9,
    /// Backend finished placing flows
    EtComputationDone = 0xFF,
}

impl MessageType {
    /// Whether a client may legitimately receive this type
    pub fn is_client_bound(self) -> bool {
        !matches!(
            self,
            MessageType::AuthReply
                | MessageType::PollStart
                | MessageType::PollStop
                | MessageType::NodesRequest
                | MessageType::LinksRequest
                | MessageType::FlowsRequest
                | MessageType::StatRequest
                | MessageType::EtSwitchesRequest
                | MessageType::EtSwitchFailures
                | MessageType::EtLinkFailures
                | MessageType::EtTrafficMatrix
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::Disconnect),
            0x01 => Ok(MessageType::AuthRequest),
            0x02 => Ok(MessageType::AuthReply),
            0x03 => Ok(MessageType::AuthStatus),
            0x08 => Ok(MessageType::EchoRequest),
            0x09 => Ok(MessageType::EchoReply),
            0x0E => Ok(MessageType::PollStart),
            0x0F => Ok(MessageType::PollStop),
            0x10 => Ok(MessageType::NodesRequest),
            0x11 => Ok(MessageType::NodesAdd),
            0x12 => Ok(MessageType::NodesDelete),
            0x13 => Ok(MessageType::LinksRequest),
            0x14 => Ok(MessageType::LinksAdd),
            0x15 => Ok(MessageType::LinksDelete),
            0x16 => Ok(MessageType::FlowsRequest),
            0x17 => Ok(MessageType::FlowsAdd),
            0x18 => Ok(MessageType::FlowsDelete),
            0x20 => Ok(MessageType::StatRequest),
            0x21 => Ok(MessageType::StatReply),
            0xF0 => Ok(MessageType::ExPowerUsage),
            0xF1 => Ok(MessageType::EtLinkUtils),
            0xF2 => Ok(MessageType::EtPowerUsage),
            0xF3 => Ok(MessageType::EtSwitchesOff),
            0xF4 => Ok(MessageType::EtBandwidth),
            0xF5 => Ok(MessageType::EtLatency),
            0xF6 => Ok(MessageType::EtSwitchesRequest),
            0xF7 => Ok(MessageType::EtSwitchFailures),
            0xF8 => Ok(MessageType::EtLinkFailures),
            0xF9 => Ok(MessageType::EtTrafficMatrix),
            0xFF => Ok(MessageType::EtComputationDone),
            _ => Err(WireError::UnknownType(value)),
        }
    }
}

/// Decoded message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total message length including this header
    pub length: u16,
    /// Message type
    pub typ: MessageType,
    /// Transaction id (0 when no reply is correlated)
    pub xid: u32,
}

impl Header {
    /// Number of body bytes that follow the header
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Encode the header
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.length);
        buf.put_u8(self.typ as u8);
        buf.put_u32(self.xid);
    }

    /// Decode a header, validating the declared length and the type code
    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let length = buf.get_u16();
        if (length as usize) < HEADER_SIZE {
            return Err(WireError::BadLength(length as usize));
        }
        let typ = MessageType::try_from(buf.get_u8())?;
        let xid = buf.get_u32();

        Ok(Self { length, typ, xid })
    }
}
