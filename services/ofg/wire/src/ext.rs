//! Extension messages used by the power-saving data center demo.
//!
//! These carry dashboard figures (power, bandwidth, latency) and a few
//! control requests. None of them touch the xid bookkeeping.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{get_f32, get_u32, get_u64, get_u8, Record};
use crate::topology::LinkRecord;
use crate::WireError;

/// EX_POWER_USAGE body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUsage {
    /// Watts currently drawn
    pub watts_current: u32,
    /// Amps currently drawn
    pub amps_current: u32,
}

impl PowerUsage {
    pub(crate) const SIZE: usize = 8;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.watts_current);
        buf.put_u32(self.amps_current);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            watts_current: get_u32(buf)?,
            amps_current: get_u32(buf)?,
        })
    }
}

/// ET_POWER_USAGE body: power compared with an always-on network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerComparison {
    /// Watts drawn now
    pub watts_current: u32,
    /// Watts a traditional network would draw
    pub watts_traditional: u32,
    /// Peak watts
    pub watts_max: u32,
}

impl PowerComparison {
    pub(crate) const SIZE: usize = 12;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.watts_current);
        buf.put_u32(self.watts_traditional);
        buf.put_u32(self.watts_max);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            watts_current: get_u32(buf)?,
            watts_traditional: get_u32(buf)?,
            watts_max: get_u32(buf)?,
        })
    }
}

/// A link and the utilization the backend computed for it (30 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkUtil {
    /// The link
    pub link: LinkRecord,
    /// Utilization in [0, 1]
    pub util: f32,
}

impl Record for LinkUtil {
    const SIZE: usize = LinkRecord::SIZE + 4;
    const NAME: &'static str = "links util";

    fn encode(&self, buf: &mut BytesMut) {
        self.link.encode(buf);
        buf.put_f32(self.util);
    }

    fn decode_unchecked(buf: &mut Bytes) -> Self {
        let link = LinkRecord::decode_unchecked(buf);
        let util = buf.get_f32();
        Self { link, util }
    }
}

/// ET_SWITCH_FAILURES body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchFailure {
    /// Affected switch
    pub dpid: u64,
    /// true to fail the switch, false to bring it back
    pub failed: bool,
}

impl SwitchFailure {
    pub(crate) const SIZE: usize = 9;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.dpid);
        buf.put_u8(u8::from(self.failed));
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            dpid: get_u64(buf)?,
            failed: get_u8(buf)? != 0,
        })
    }
}

/// ET_LINK_FAILURES body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFailure {
    /// Affected link
    pub link: LinkRecord,
    /// true to fail the link, false to bring it back
    pub failed: bool,
}

impl LinkFailure {
    pub(crate) const SIZE: usize = LinkRecord::SIZE + 1;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        self.link.encode(buf);
        buf.put_u8(u8::from(self.failed));
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            link: LinkRecord::decode(buf)?,
            failed: get_u8(buf)? != 0,
        })
    }
}

/// ET_TRAFFIC_MATRIX body (22 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficMatrix {
    /// Use the hardware testbed
    pub use_hw: bool,
    /// Allow the solver to split flows
    pub may_split_flows: bool,
    /// Fat tree size
    pub k: u32,
    /// Demand per host as a fraction of line rate
    pub demand: f32,
    /// Fraction of traffic staying under the edge switch
    pub edge: f32,
    /// Fraction of traffic staying under the aggregation layer
    pub agg: f32,
    /// Packet length in bytes
    pub plen: u32,
}

impl TrafficMatrix {
    pub(crate) const SIZE: usize = 22;

    /// Build a traffic matrix, rejecting fractions outside [0, 1]
    pub fn new(
        use_hw: bool,
        may_split_flows: bool,
        k: u32,
        demand: f32,
        edge: f32,
        agg: f32,
        plen: u32,
    ) -> Result<Self, WireError> {
        let tm = Self {
            use_hw,
            may_split_flows,
            k,
            demand,
            edge,
            agg,
            plen,
        };
        tm.validate()?;
        Ok(tm)
    }

    /// Check the fraction fields
    pub fn validate(&self) -> Result<(), WireError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.demand) {
            return Err(WireError::InvalidValue("demand must be between 0 and 1"));
        }
        if !unit.contains(&self.edge) {
            return Err(WireError::InvalidValue("edge must be between 0 and 1"));
        }
        if !unit.contains(&self.agg) {
            return Err(WireError::InvalidValue("agg must be between 0 and 1"));
        }
        if self.edge + self.agg > 1.0 {
            return Err(WireError::InvalidValue("edge + agg must not exceed 1"));
        }
        Ok(())
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.use_hw));
        buf.put_u8(u8::from(self.may_split_flows));
        buf.put_u32(self.k);
        buf.put_f32(self.demand);
        buf.put_f32(self.edge);
        buf.put_f32(self.agg);
        buf.put_u32(self.plen);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let tm = Self {
            use_hw: get_u8(buf)? != 0,
            may_split_flows: get_u8(buf)? != 0,
            k: get_u32(buf)?,
            demand: get_f32(buf)?,
            edge: get_f32(buf)?,
            agg: get_f32(buf)?,
            plen: get_u32(buf)?,
        };
        tm.validate()?;
        Ok(tm)
    }
}
