//! Per-link traffic statistics.
//!
//! Switches report cumulative packet, byte and flow counters. Rates are
//! derived from consecutive samples and smoothed with an exponentially
//! weighted moving average.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ofg_session::MessageSink;
use ofg_wire::AggregateStatsReply;

/// Weight of a new sample when none is configured (no smoothing)
pub const DEFAULT_WEIGHT_OF_NEW: f64 = 1.0;

/// Counters and smoothed rates for one switch port
#[derive(Debug, Clone)]
pub struct PortStatsRates {
    weight_of_new: f64,
    packets: u64,
    bytes: u64,
    flows: u32,
    updated_at: Option<Instant>,
    packets_per_sec: f64,
    bits_per_sec: f64,
    flows_per_sec: f64,
}

impl PortStatsRates {
    /// Rates with the given smoothing weight, clamped to [0, 1]
    pub fn new(weight_of_new: f64) -> Self {
        Self {
            weight_of_new: weight_of_new.clamp(0.0, 1.0),
            packets: 0,
            bytes: 0,
            flows: 0,
            updated_at: None,
            packets_per_sec: 0.0,
            bits_per_sec: 0.0,
            flows_per_sec: 0.0,
        }
    }

    /// Smoothing weight in use
    pub fn weight_of_new(&self) -> f64 {
        self.weight_of_new
    }

    /// Change the smoothing weight, clamped to [0, 1]
    pub fn set_weight_of_new(&mut self, weight: f64) {
        self.weight_of_new = weight.clamp(0.0, 1.0);
    }

    /// Fold in a new counter sample taken at `when`
    ///
    /// The first sample only establishes a baseline. A counter that went
    /// backwards is treated as reset to zero.
    pub fn update(&mut self, packets: u64, bytes: u64, flows: u32, when: Instant) {
        if let Some(prev) = self.updated_at {
            let dt = when.saturating_duration_since(prev).as_secs_f64();
            if dt > 0.0 {
                let dp = counter_delta(self.packets, packets) as f64;
                let db = 8.0 * counter_delta(self.bytes, bytes) as f64;
                let df = flows as f64 - self.flows as f64;

                let old = 1.0 - self.weight_of_new;
                self.packets_per_sec = self.weight_of_new * (dp / dt) + old * self.packets_per_sec;
                self.bits_per_sec = self.weight_of_new * (db / dt) + old * self.bits_per_sec;
                self.flows_per_sec = self.weight_of_new * (df / dt) + old * self.flows_per_sec;
            }
        }

        self.packets = packets;
        self.bytes = bytes;
        self.flows = flows;
        self.updated_at = Some(when);
    }

    /// Fold in an aggregate statistics reply
    pub fn update_from(&mut self, reply: &AggregateStatsReply, when: Instant) {
        self.update(reply.packet_count, reply.byte_count, reply.flow_count, when);
    }

    /// Whether any sample has arrived
    pub fn has_sample(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Smoothed packets per second
    pub fn packets_per_sec(&self) -> f64 {
        self.packets_per_sec
    }

    /// Smoothed bits per second
    pub fn bits_per_sec(&self) -> f64 {
        self.bits_per_sec
    }

    /// Smoothed change in flow count per second
    pub fn flows_per_sec(&self) -> f64 {
        self.flows_per_sec
    }
}

impl Default for PortStatsRates {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHT_OF_NEW)
    }
}

fn counter_delta(prev: u64, now: u64) -> u64 {
    if now >= prev {
        now - prev
    } else {
        now
    }
}

/// Statistics for both ends of a link
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Traffic leaving the source port
    pub src: PortStatsRates,
    /// Traffic leaving the destination port
    pub dst: PortStatsRates,
}

impl LinkStats {
    /// Both ends with the same smoothing weight
    pub fn new(weight_of_new: f64) -> Self {
        Self {
            src: PortStatsRates::new(weight_of_new),
            dst: PortStatsRates::new(weight_of_new),
        }
    }

    /// Whether either end has reported
    pub fn has_sample(&self) -> bool {
        self.src.has_sample() || self.dst.has_sample()
    }

    /// Mean bit rate of the two ends; the source alone until the
    /// destination reports
    pub fn average_bits_per_sec(&self) -> f64 {
        if self.dst.has_sample() && self.src.has_sample() {
            (self.src.bits_per_sec() + self.dst.bits_per_sec()) / 2.0
        } else if self.dst.has_sample() {
            self.dst.bits_per_sec()
        } else {
            self.src.bits_per_sec()
        }
    }
}

/// A statistics request a link is waiting on
#[derive(Clone)]
pub struct StatsSubscription {
    /// Xid replies will carry
    pub xid: u32,
    /// Whether the backend resends the request periodically
    pub is_polling: bool,
    /// Where to send POLL_STOP when tracking ends
    pub sink: Arc<dyn MessageSink>,
    /// Accumulated statistics
    pub stats: LinkStats,
}

impl fmt::Debug for StatsSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsSubscription")
            .field("xid", &self.xid)
            .field("is_polling", &self.is_polling)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_sample_is_baseline() {
        let t0 = Instant::now();
        let mut rates = PortStatsRates::default();
        rates.update(100, 1_000_000, 3, t0);
        assert!(rates.has_sample());
        assert_eq!(rates.bits_per_sec(), 0.0);

        rates.update(200, 2_000_000, 4, t0 + Duration::from_secs(2));
        assert_eq!(rates.packets_per_sec(), 50.0);
        assert_eq!(rates.bits_per_sec(), 4_000_000.0);
        assert_eq!(rates.flows_per_sec(), 0.5);
    }

    #[test]
    fn test_ewma_weighting() {
        let t0 = Instant::now();
        let mut rates = PortStatsRates::new(0.5);
        rates.update(0, 0, 0, t0);
        rates.update(0, 1000, 0, t0 + Duration::from_secs(1));
        assert_eq!(rates.bits_per_sec(), 4000.0);
        rates.update(0, 1000, 0, t0 + Duration::from_secs(2));
        assert_eq!(rates.bits_per_sec(), 2000.0);
    }

    #[test]
    fn test_weight_clamped() {
        assert_eq!(PortStatsRates::new(3.0).weight_of_new(), 1.0);
        assert_eq!(PortStatsRates::new(-1.0).weight_of_new(), 0.0);
    }

    #[test]
    fn test_zero_dt_ignored() {
        let t0 = Instant::now();
        let mut rates = PortStatsRates::default();
        rates.update(0, 0, 0, t0);
        rates.update(0, 1000, 0, t0);
        assert_eq!(rates.bits_per_sec(), 0.0);
    }

    #[test]
    fn test_counter_reset() {
        let t0 = Instant::now();
        let mut rates = PortStatsRates::default();
        rates.update(0, 5000, 0, t0);
        rates.update(0, 100, 0, t0 + Duration::from_secs(1));
        assert_eq!(rates.bits_per_sec(), 800.0);
    }

    #[test]
    fn test_link_average() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let mut stats = LinkStats::default();
        assert!(!stats.has_sample());

        stats.src.update(0, 0, 0, t0);
        stats.src.update(0, 1000, 0, t1);
        assert_eq!(stats.average_bits_per_sec(), 8000.0);

        stats.dst.update(0, 0, 0, t0);
        stats.dst.update(0, 0, 0, t1);
        assert_eq!(stats.average_bits_per_sec(), 4000.0);
    }
}
