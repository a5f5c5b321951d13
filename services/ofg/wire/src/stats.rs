//! Switch statistics requests and replies.
//!
//! Both directions start with a 12-byte stats header naming the switch and
//! the statistics kind; the rest of the body depends on the kind.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{get_bytes, get_u16, get_u32, get_u64, get_u8, Record};
use crate::strings::{read_fixed, write_fixed};
use crate::WireError;

/// Statistics kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatsType {
    /// Switch description strings
    Desc,
    /// Per-flow counters
    Flow,
    /// Counters aggregated over a match
    Aggregate,
    /// Flow table counters
    Table,
    /// Port counters
    Port,
    /// Vendor extension
    Vendor,
    /// Code this client has no name for
    Other(u16),
}

impl StatsType {
    /// Wire code
    pub fn code(self) -> u16 {
        match self {
            StatsType::Desc => 0,
            StatsType::Flow => 1,
            StatsType::Aggregate => 2,
            StatsType::Table => 3,
            StatsType::Port => 4,
            StatsType::Vendor => 0xFFFF,
            StatsType::Other(code) => code,
        }
    }
}

impl From<u16> for StatsType {
    fn from(code: u16) -> Self {
        match code {
            0 => StatsType::Desc,
            1 => StatsType::Flow,
            2 => StatsType::Aggregate,
            3 => StatsType::Table,
            4 => StatsType::Port,
            0xFFFF => StatsType::Vendor,
            other => StatsType::Other(other),
        }
    }
}

/// Stats header: `u64 dpid`, `u16 stats_type`, `u16 flags` (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsHeader {
    /// Switch the statistics are about
    pub dpid: u64,
    /// Statistics kind
    pub stats_type: StatsType,
    /// Reply flags (none are defined for requests)
    pub flags: u16,
}

impl StatsHeader {
    /// Header with no flags set
    pub fn new(dpid: u64, stats_type: StatsType) -> Self {
        Self {
            dpid,
            stats_type,
            flags: 0,
        }
    }
}

impl Record for StatsHeader {
    const SIZE: usize = 12;
    const NAME: &'static str = "stats header";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.dpid);
        buf.put_u16(self.stats_type.code());
        buf.put_u16(self.flags);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let dpid = buf.get_u64();
        let stats_type = StatsType::from(buf.get_u16());
        let flags = buf.get_u16();
        Self {
            dpid,
            stats_type,
            flags,
        }
    }
}

bitflags! {
    /// Match wildcard bits; a set bit means "ignore this field"
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Wildcards: u32 {
        /// Switch input port
        const IN_PORT = 1 << 0;
        /// VLAN id
        const DL_VLAN = 1 << 1;
        /// Ethernet source address
        const DL_SRC = 1 << 2;
        /// Ethernet destination address
        const DL_DST = 1 << 3;
        /// Ethernet frame type
        const DL_TYPE = 1 << 4;
        /// IP protocol
        const NW_PROTO = 1 << 5;
        /// TCP/UDP source port
        const TP_SRC = 1 << 6;
        /// TCP/UDP destination port
        const TP_DST = 1 << 7;
        /// IP source prefix wildcard width (6 bits)
        const NW_SRC_MASK = 0x3F << 8;
        /// IP destination prefix wildcard width (6 bits)
        const NW_DST_MASK = 0x3F << 14;
        /// VLAN priority
        const DL_VLAN_PCP = 1 << 20;
        /// IP type of service
        const NW_TOS = 1 << 21;
        /// Every field wildcarded
        const ALL = (1 << 22) - 1;
    }
}

/// Flow match (40 bytes, OpenFlow 1.0 layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    /// Wildcarded fields
    pub wildcards: Wildcards,
    /// Input port
    pub in_port: u16,
    /// Ethernet source
    pub dl_src: [u8; 6],
    /// Ethernet destination
    pub dl_dst: [u8; 6],
    /// VLAN id
    pub dl_vlan: u16,
    /// VLAN priority
    pub dl_vlan_pcp: u8,
    /// Ethernet frame type
    pub dl_type: u16,
    /// IP type of service
    pub nw_tos: u8,
    /// IP protocol
    pub nw_proto: u8,
    /// IP source
    pub nw_src: u32,
    /// IP destination
    pub nw_dst: u32,
    /// Transport source port
    pub tp_src: u16,
    /// Transport destination port
    pub tp_dst: u16,
}

impl Match {
    /// Match every packet
    pub fn all() -> Self {
        Self {
            wildcards: Wildcards::ALL,
            in_port: 0,
            dl_src: [0; 6],
            dl_dst: [0; 6],
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: 0,
            nw_dst: 0,
            tp_src: 0,
            tp_dst: 0,
        }
    }

    /// Whether every field is wildcarded
    pub fn is_wildcard_all(&self) -> bool {
        self.wildcards.contains(Wildcards::ALL)
    }
}

impl Default for Match {
    fn default() -> Self {
        Self::all()
    }
}

impl Record for Match {
    const SIZE: usize = 40;
    const NAME: &'static str = "match";

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.wildcards.bits());
        buf.put_u16(self.in_port);
        buf.put_slice(&self.dl_src);
        buf.put_slice(&self.dl_dst);
        buf.put_u16(self.dl_vlan);
        buf.put_u8(self.dl_vlan_pcp);
        buf.put_u8(0);
        buf.put_u16(self.dl_type);
        buf.put_u8(self.nw_tos);
        buf.put_u8(self.nw_proto);
        buf.put_u16(0);
        buf.put_u32(self.nw_src);
        buf.put_u32(self.nw_dst);
        buf.put_u16(self.tp_src);
        buf.put_u16(self.tp_dst);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let wildcards = Wildcards::from_bits_retain(buf.get_u32());
        let in_port = buf.get_u16();
        let mut dl_src = [0u8; 6];
        buf.copy_to_slice(&mut dl_src);
        let mut dl_dst = [0u8; 6];
        buf.copy_to_slice(&mut dl_dst);
        let dl_vlan = buf.get_u16();
        let dl_vlan_pcp = buf.get_u8();
        buf.advance(1);
        let dl_type = buf.get_u16();
        let nw_tos = buf.get_u8();
        let nw_proto = buf.get_u8();
        buf.advance(2);
        let nw_src = buf.get_u32();
        let nw_dst = buf.get_u32();
        let tp_src = buf.get_u16();
        let tp_dst = buf.get_u16();
        Self {
            wildcards,
            in_port,
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_pcp,
            dl_type,
            nw_tos,
            nw_proto,
            nw_src,
            nw_dst,
            tp_src,
            tp_dst,
        }
    }
}

/// Table id meaning "all tables"
pub const ALL_TABLES: u8 = 0xFF;
/// Output port meaning "no restriction"
pub const OFPP_NONE: u16 = 0xFFFF;

/// Aggregate statistics request for the traffic matching `matcher`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateStatsRequest {
    /// Switch to ask
    pub dpid: u64,
    /// Header flags
    pub flags: u16,
    /// Traffic filter
    pub matcher: Match,
    /// Table to read, or [`ALL_TABLES`]
    pub table_id: u8,
    /// Restrict to flows forwarding to this port, or [`OFPP_NONE`]
    pub out_port: u16,
}

impl AggregateStatsRequest {
    /// Body size after the stats header
    pub const BODY_SIZE: usize = Match::SIZE + 4;

    /// Aggregate request for traffic out of `out_port` on switch `dpid`
    pub fn new(dpid: u64, out_port: u16, matcher: Match) -> Self {
        Self {
            dpid,
            flags: 0,
            matcher,
            table_id: ALL_TABLES,
            out_port,
        }
    }
}

/// Aggregate statistics reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateStatsReply {
    /// Switch that answered
    pub dpid: u64,
    /// Header flags
    pub flags: u16,
    /// Packets matched
    pub packet_count: u64,
    /// Bytes matched
    pub byte_count: u64,
    /// Flows matched
    pub flow_count: u32,
}

impl AggregateStatsReply {
    /// Body size after the stats header
    pub const BODY_SIZE: usize = 24;
}

/// Width of the description strings
pub const DESC_STR_LEN: usize = 256;
/// Width of the serial number string
pub const SERIAL_NUM_LEN: usize = 32;

/// Switch description strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SwitchDescription {
    /// Manufacturer
    pub manufacturer: String,
    /// Hardware description
    pub hw_desc: String,
    /// Software description
    pub sw_desc: String,
    /// Serial number
    pub serial_num: String,
    /// Human readable datapath description
    pub dp_desc: String,
}

impl SwitchDescription {
    /// Body size after the stats header
    pub const BODY_SIZE: usize = 4 * DESC_STR_LEN + SERIAL_NUM_LEN;

    fn encode(&self, buf: &mut BytesMut) {
        write_fixed(buf, &self.manufacturer, DESC_STR_LEN);
        write_fixed(buf, &self.hw_desc, DESC_STR_LEN);
        write_fixed(buf, &self.sw_desc, DESC_STR_LEN);
        write_fixed(buf, &self.serial_num, SERIAL_NUM_LEN);
        write_fixed(buf, &self.dp_desc, DESC_STR_LEN);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            manufacturer: read_fixed(buf, DESC_STR_LEN)?,
            hw_desc: read_fixed(buf, DESC_STR_LEN)?,
            sw_desc: read_fixed(buf, DESC_STR_LEN)?,
            serial_num: read_fixed(buf, SERIAL_NUM_LEN)?,
            dp_desc: read_fixed(buf, DESC_STR_LEN)?,
        })
    }
}

/// STAT_REQUEST body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatsRequest {
    /// Aggregate counters over a match
    Aggregate(AggregateStatsRequest),
    /// Switch description (header only)
    Description {
        /// Switch to describe
        dpid: u64,
    },
    /// Any other kind, kept as raw bytes after the header
    Other {
        /// Stats header
        header: StatsHeader,
        /// Raw body
        body: Bytes,
    },
}

impl StatsRequest {
    /// Switch this request targets
    pub fn dpid(&self) -> u64 {
        match self {
            StatsRequest::Aggregate(req) => req.dpid,
            StatsRequest::Description { dpid } => *dpid,
            StatsRequest::Other { header, .. } => header.dpid,
        }
    }

    /// Whether the reply must be matched back to this request by xid
    pub fn is_stateful(&self) -> bool {
        matches!(self, StatsRequest::Aggregate(_))
    }

    pub(crate) fn body_len(&self) -> usize {
        StatsHeader::SIZE
            + match self {
                StatsRequest::Aggregate(_) => AggregateStatsRequest::BODY_SIZE,
                StatsRequest::Description { .. } => 0,
                StatsRequest::Other { body, .. } => body.len(),
            }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            StatsRequest::Aggregate(req) => {
                StatsHeader {
                    dpid: req.dpid,
                    stats_type: StatsType::Aggregate,
                    flags: req.flags,
                }
                .encode(buf);
                req.matcher.encode(buf);
                buf.put_u8(req.table_id);
                buf.put_u8(0);
                buf.put_u16(req.out_port);
            }
            StatsRequest::Description { dpid } => {
                StatsHeader::new(*dpid, StatsType::Desc).encode(buf);
            }
            StatsRequest::Other { header, body } => {
                header.encode(buf);
                buf.put_slice(body);
            }
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let header = StatsHeader::decode(buf)?;
        match header.stats_type {
            StatsType::Aggregate => {
                let matcher = Match::decode(buf)?;
                let table_id = get_u8(buf)?;
                get_u8(buf)?;
                let out_port = get_u16(buf)?;
                Ok(StatsRequest::Aggregate(AggregateStatsRequest {
                    dpid: header.dpid,
                    flags: header.flags,
                    matcher,
                    table_id,
                    out_port,
                }))
            }
            StatsType::Desc => Ok(StatsRequest::Description { dpid: header.dpid }),
            _ => {
                let body = buf.split_to(buf.len());
                Ok(StatsRequest::Other { header, body })
            }
        }
    }
}

/// STAT_REPLY body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatsReply {
    /// Aggregate counters
    Aggregate(AggregateStatsReply),
    /// Switch description
    Description {
        /// Switch described
        dpid: u64,
        /// Header flags
        flags: u16,
        /// Description strings
        desc: SwitchDescription,
    },
    /// Any other kind, kept as raw bytes after the header
    Other {
        /// Stats header
        header: StatsHeader,
        /// Raw body
        body: Bytes,
    },
}

impl StatsReply {
    /// Switch that answered
    pub fn dpid(&self) -> u64 {
        match self {
            StatsReply::Aggregate(reply) => reply.dpid,
            StatsReply::Description { dpid, .. } => *dpid,
            StatsReply::Other { header, .. } => header.dpid,
        }
    }

    pub(crate) fn body_len(&self) -> usize {
        StatsHeader::SIZE
            + match self {
                StatsReply::Aggregate(_) => AggregateStatsReply::BODY_SIZE,
                StatsReply::Description { .. } => SwitchDescription::BODY_SIZE,
                StatsReply::Other { body, .. } => body.len(),
            }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            StatsReply::Aggregate(reply) => {
                StatsHeader {
                    dpid: reply.dpid,
                    stats_type: StatsType::Aggregate,
                    flags: reply.flags,
                }
                .encode(buf);
                buf.put_u64(reply.packet_count);
                buf.put_u64(reply.byte_count);
                buf.put_u32(reply.flow_count);
                buf.put_u32(0);
            }
            StatsReply::Description { dpid, flags, desc } => {
                StatsHeader {
                    dpid: *dpid,
                    stats_type: StatsType::Desc,
                    flags: *flags,
                }
                .encode(buf);
                desc.encode(buf);
            }
            StatsReply::Other { header, body } => {
                header.encode(buf);
                buf.put_slice(body);
            }
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let header = StatsHeader::decode(buf)?;
        match header.stats_type {
            StatsType::Aggregate => {
                let packet_count = get_u64(buf)?;
                let byte_count = get_u64(buf)?;
                let flow_count = get_u32(buf)?;
                get_u32(buf)?;
                Ok(StatsReply::Aggregate(AggregateStatsReply {
                    dpid: header.dpid,
                    flags: header.flags,
                    packet_count,
                    byte_count,
                    flow_count,
                }))
            }
            StatsType::Desc => Ok(StatsReply::Description {
                dpid: header.dpid,
                flags: header.flags,
                desc: SwitchDescription::decode(buf)?,
            }),
            _ => {
                let body = get_bytes(buf, buf.len())?;
                Ok(StatsReply::Other { header, body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_all() {
        let m = Match::all();
        assert!(m.is_wildcard_all());
        assert_eq!(m.wildcards.bits(), (1 << 22) - 1);

        let mut narrow = Match::all();
        narrow.wildcards.remove(Wildcards::IN_PORT);
        narrow.in_port = 3;
        assert!(!narrow.is_wildcard_all());
    }

    #[test]
    fn test_match_layout() {
        let mut m = Match::all();
        m.dl_src = [1, 2, 3, 4, 5, 6];
        m.nw_src = 0x0A000001;
        m.tp_dst = 80;

        let mut buf = BytesMut::new();
        m.encode(&mut buf);
        assert_eq!(buf.len(), Match::SIZE);
        assert_eq!(&buf[6..12], &[1, 2, 3, 4, 5, 6]);

        let mut bytes = buf.freeze();
        assert_eq!(Match::decode(&mut bytes).unwrap(), m);
    }

    #[test]
    fn test_description_reply_strings() {
        let reply = StatsReply::Description {
            dpid: 7,
            flags: 0,
            desc: SwitchDescription {
                manufacturer: "Nicira".into(),
                hw_desc: "NetFPGA".into(),
                sw_desc: "1.0".into(),
                serial_num: "0001".into(),
                dp_desc: "edge-1".into(),
            },
        };

        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(buf.len(), reply.body_len());
        assert_eq!(buf.len(), 12 + 1056);

        let mut bytes = buf.freeze();
        assert_eq!(StatsReply::decode(&mut bytes).unwrap(), reply);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_unknown_stats_kept_raw() {
        let req = StatsRequest::Other {
            header: StatsHeader::new(9, StatsType::Port),
            body: Bytes::from_static(&[1, 2, 3]),
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);

        let mut bytes = buf.freeze();
        let decoded = StatsRequest::decode(&mut bytes).unwrap();
        assert_eq!(decoded, req);
        assert!(!decoded.is_stateful());
    }
}
