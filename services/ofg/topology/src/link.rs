//! Links between nodes and the arena that owns them.
//!
//! A link is identified by its direction: `(src, src_port, dst, dst_port)`.
//! The reverse direction is a different link. Statistics, on the other
//! hand, are kept for both ends of a link and averaged.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use ofg_session::MessageSink;
use ofg_wire::{
    poll_interval_units, AggregateStatsReply, AggregateStatsRequest, LinkRecord, LinkType, Match,
    Message, Payload, PollStart, StatsRequest,
};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{LinkAlreadyExists, TopologyError};
use crate::node::{HasPorts, Node};
use crate::ref_track::ConnectionId;
use crate::stats::{LinkStats, StatsSubscription, DEFAULT_WEIGHT_OF_NEW};

/// Capacity assumed when the backend does not report one (1 Gbps)
pub const DEFAULT_MAX_DATA_RATE_BPS: f64 = 1_000_000_000.0;

/// Directed link identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId {
    /// Source node id
    pub src: u64,
    /// Port on the source
    pub src_port: u16,
    /// Destination node id
    pub dst: u64,
    /// Port on the destination
    pub dst_port: u16,
}

impl LinkId {
    /// The port this link uses on `node`, if `node` is an endpoint
    pub fn port_of(&self, node: u64) -> Option<u16> {
        if self.src == node {
            Some(self.src_port)
        } else if self.dst == node {
            Some(self.dst_port)
        } else {
            None
        }
    }

    /// The other endpoint
    pub fn other(&self, node: u64) -> Option<u64> {
        if self.src == node {
            Some(self.dst)
        } else if self.dst == node {
            Some(self.src)
        } else {
            None
        }
    }
}

impl From<&LinkRecord> for LinkId {
    fn from(rec: &LinkRecord) -> Self {
        Self {
            src: rec.src.id,
            src_port: rec.src_port,
            dst: rec.dst.id,
            dst_port: rec.dst_port,
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}:{} -> {:#x}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

#[derive(Debug)]
struct LinkProps {
    link_type: LinkType,
    max_data_rate_bps: f64,
    reported_utilization: Option<f64>,
}

/// A link known to at least one connection
pub struct Link {
    id: LinkId,
    props: Mutex<LinkProps>,
    failed: AtomicBool,
    owners: Mutex<SmallVec<[ConnectionId; 2]>>,
    stats: Mutex<HashMap<Match, StatsSubscription>>,
}

impl Link {
    fn new(id: LinkId, link_type: LinkType) -> Self {
        Self {
            id,
            props: Mutex::new(LinkProps {
                link_type,
                max_data_rate_bps: DEFAULT_MAX_DATA_RATE_BPS,
                reported_utilization: None,
            }),
            failed: AtomicBool::new(false),
            owners: Mutex::new(SmallVec::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Directed identity
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Link kind
    pub fn link_type(&self) -> LinkType {
        self.props.lock().link_type
    }

    /// Change the link kind
    pub fn set_link_type(&self, link_type: LinkType) {
        self.props.lock().link_type = link_type;
    }

    /// Capacity in bits per second
    pub fn max_data_rate_bps(&self) -> f64 {
        self.props.lock().max_data_rate_bps
    }

    /// Set the capacity; 0 means "unknown" and selects the 1 Gbps default
    pub fn set_max_data_rate_bps(&self, bps: u64) {
        self.props.lock().max_data_rate_bps = if bps == 0 {
            DEFAULT_MAX_DATA_RATE_BPS
        } else {
            bps as f64
        };
    }

    /// Whether the link has been reported failed
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mark the link failed or recovered
    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Relaxed);
    }

    /// Record that `owner` announced this link
    pub fn claim(&self, owner: ConnectionId) {
        let mut owners = self.owners.lock();
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }

    /// Drop `owner`'s claim, returning true when nobody claims the link
    pub fn release(&self, owner: ConnectionId) -> bool {
        let mut owners = self.owners.lock();
        owners.retain(|o| *o != owner);
        owners.is_empty()
    }

    /// Whether `owner` announced this link
    pub fn is_owned_by(&self, owner: ConnectionId) -> bool {
        self.owners.lock().contains(&owner)
    }

    /// Start collecting statistics for traffic matching `m`
    ///
    /// A nonzero `poll_interval_ms` asks the backend to resend the request
    /// periodically; zero fetches once. Any previous subscription for the
    /// same match is stopped first. Returns the xid replies will carry.
    pub fn track_stats(
        &self,
        poll_interval_ms: u64,
        m: Match,
        sink: Arc<dyn MessageSink>,
    ) -> Result<u32, TopologyError> {
        if let Err(e) = self.stop_tracking(&m) {
            debug!("Stopping previous stats for {} failed: {}", self.id, e);
        }

        let interval = poll_interval_units(poll_interval_ms);
        let request = Message::new(Payload::StatRequest(StatsRequest::Aggregate(
            AggregateStatsRequest::new(self.id.src, self.id.src_port, m),
        )));
        let is_polling = interval != 0;
        let msg = if is_polling {
            Message::new(Payload::PollStart(PollStart {
                interval,
                inner: Box::new(request),
            }))
        } else {
            request
        };

        let xid = sink.send(msg)?;
        debug!(
            "Tracking stats on {} (xid {}, polling: {})",
            self.id, xid, is_polling
        );
        self.stats.lock().insert(
            m,
            StatsSubscription {
                xid,
                is_polling,
                sink,
                stats: LinkStats::new(DEFAULT_WEIGHT_OF_NEW),
            },
        );
        Ok(xid)
    }

    /// Stop collecting statistics for `m`, sending POLL_STOP if polled
    pub fn stop_tracking(&self, m: &Match) -> Result<(), TopologyError> {
        let removed = self.stats.lock().remove(m);
        match removed {
            Some(sub) if sub.is_polling => {
                sub.sink.send(Message::new(Payload::PollStop(sub.xid)))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Stop every subscription
    ///
    /// All entries are removed even when a POLL_STOP cannot be sent; the
    /// first send error is returned.
    pub fn stop_all_stats(&self) -> Result<(), TopologyError> {
        let subs: Vec<StatsSubscription> = self.stats.lock().drain().map(|(_, s)| s).collect();
        let mut first_err = None;
        for sub in subs.into_iter().filter(|s| s.is_polling) {
            if let Err(e) = sub.sink.send(Message::new(Payload::PollStop(sub.xid))) {
                if first_err.is_none() {
                    first_err = Some(TopologyError::Send(e));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether statistics for `m` are being collected
    pub fn is_tracking(&self, m: &Match) -> bool {
        self.stats.lock().contains_key(m)
    }

    /// Snapshot of the statistics for `m`
    pub fn stats(&self, m: &Match) -> Option<LinkStats> {
        self.stats.lock().get(m).map(|s| s.stats.clone())
    }

    /// Apply a statistics reply for `m`
    ///
    /// The reply updates whichever end matches its dpid. Returns false
    /// when `m` is not being tracked.
    pub fn update_stats(&self, m: &Match, reply: &AggregateStatsReply, when: Instant) -> bool {
        let mut stats = self.stats.lock();
        let Some(sub) = stats.get_mut(m) else {
            warn!("{} received stats it is not tracking", self.id);
            return false;
        };

        if reply.dpid == self.id.src {
            sub.stats.src.update_from(reply, when);
        } else if reply.dpid == self.id.dst {
            sub.stats.dst.update_from(reply, when);
        } else {
            warn!(
                "{} received stats from unrelated switch {:#x}",
                self.id, reply.dpid
            );
        }
        true
    }

    /// Record a utilization computed by the backend
    pub fn set_reported_utilization(&self, utilization: f64) {
        self.props.lock().reported_utilization = Some(utilization.clamp(0.0, 1.0));
    }

    /// Current bit rate from the unfiltered statistics, or -1 if untracked
    pub fn data_rate_bps(&self) -> f64 {
        let stats = self.stats.lock();
        stats
            .iter()
            .find(|(m, s)| m.is_wildcard_all() && s.stats.has_sample())
            .map(|(_, s)| s.stats.average_bits_per_sec())
            .unwrap_or(-1.0)
    }

    /// Utilization in [0, 1], or -1 when nothing is known
    ///
    /// Measured statistics take precedence over a backend-reported value.
    pub fn utilization(&self) -> f64 {
        let rate = self.data_rate_bps();
        let props = self.props.lock();
        if rate >= 0.0 {
            (rate / props.max_data_rate_bps).clamp(0.0, 1.0)
        } else {
            props.reported_utilization.unwrap_or(-1.0)
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("props", &*self.props.lock())
            .field("owners", &*self.owners.lock())
            .finish()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Every live link, keyed by identity
#[derive(Debug, Default)]
pub struct LinkArena {
    links: DashMap<LinkId, Arc<Link>>,
    construction: Mutex<()>,
}

impl LinkArena {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the link `src:src_port -> dst:dst_port`
    ///
    /// Fails with the existing link if the same directed link is already
    /// attached to `src`.
    pub fn connect(
        &self,
        src: &Node,
        src_port: u16,
        dst: &Node,
        dst_port: u16,
        link_type: LinkType,
    ) -> Result<Arc<Link>, LinkAlreadyExists> {
        let _guard = self.construction.lock();

        if let Some(id) = src.directed_link_to(src_port, dst.id(), dst_port) {
            if let Some(existing) = self.get(&id) {
                return Err(LinkAlreadyExists { existing });
            }
        }

        let id = LinkId {
            src: src.id(),
            src_port,
            dst: dst.id(),
            dst_port,
        };
        let link = Arc::new(Link::new(id, link_type));
        self.links.insert(id, Arc::clone(&link));
        src.attach(id);
        dst.attach(id);
        Ok(link)
    }

    /// Remove `link` from the arena and from both endpoints, then stop
    /// its statistics
    ///
    /// Cleanup happens even if a POLL_STOP fails; the first send error is
    /// returned.
    pub fn disconnect(
        &self,
        link: &Link,
        src: Option<&Node>,
        dst: Option<&Node>,
    ) -> Result<(), TopologyError> {
        {
            let _guard = self.construction.lock();
            self.links.remove(&link.id());
            for node in [src, dst].into_iter().flatten() {
                node.detach(&link.id());
            }
        }
        link.stop_all_stats()
    }

    /// Look up a link
    pub fn get(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.links.get(id).map(|l| Arc::clone(l.value()))
    }

    /// Links claimed by `owner`
    pub fn owned_by(&self, owner: ConnectionId) -> Vec<Arc<Link>> {
        self.links
            .iter()
            .filter(|l| l.is_owned_by(owner))
            .map(|l| Arc::clone(l.value()))
            .collect()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether there are no links
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use ofg_session::SessionError;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Message>>,
        next_xid: Mutex<u32>,
    }

    impl MessageSink for RecordingSink {
        fn send(&self, mut msg: Message) -> Result<u32, SessionError> {
            let mut next = self.next_xid.lock();
            *next += 1;
            msg.xid = *next;
            let reply_xid = match &mut msg.payload {
                Payload::PollStart(poll) => {
                    *next += 1;
                    poll.inner.xid = *next;
                    *next
                }
                _ => msg.xid,
            };
            self.sent.lock().push(msg);
            Ok(reply_xid)
        }
    }

    struct DownSink;

    impl MessageSink for DownSink {
        fn send(&self, _msg: Message) -> Result<u32, SessionError> {
            Err(SessionError::NotConnected)
        }
    }

    fn pair() -> (Node, Node) {
        (Node::new(1, NodeKind::Switch), Node::new(2, NodeKind::Switch))
    }

    #[test]
    fn test_duplicate_link_detected() {
        let arena = LinkArena::new();
        let (a, b) = pair();

        let first = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();
        let dup = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap_err();
        assert!(Arc::ptr_eq(&first, &dup.existing));
        assert_eq!(arena.len(), 1);
        assert_eq!(a.link_ids(), vec![first.id()]);
        assert_eq!(b.link_ids(), vec![first.id()]);
    }

    #[test]
    fn test_reverse_direction_is_distinct() {
        let arena = LinkArena::new();
        let (a, b) = pair();

        arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();
        arena.connect(&b, 2, &a, 1, LinkType::Wire).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(a.link_ids().len(), 2);
    }

    #[test]
    fn test_disconnect_detaches() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();

        arena.disconnect(&link, Some(&a), Some(&b)).unwrap();
        assert!(arena.is_empty());
        assert!(a.link_ids().is_empty());
        assert!(b.link_ids().is_empty());
        assert!(arena.connect(&a, 1, &b, 2, LinkType::Wire).is_ok());
    }

    #[test]
    fn test_capacity_default() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();

        link.set_max_data_rate_bps(0);
        assert_eq!(link.max_data_rate_bps(), DEFAULT_MAX_DATA_RATE_BPS);
        link.set_max_data_rate_bps(100_000_000);
        assert_eq!(link.max_data_rate_bps(), 100_000_000.0);
    }

    #[test]
    fn test_track_poll_and_stop() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();
        let sink = Arc::new(RecordingSink::default());

        let xid = link.track_stats(250, Match::all(), sink.clone()).unwrap();
        {
            let sent = sink.sent.lock();
            match &sent[0].payload {
                Payload::PollStart(poll) => {
                    assert_eq!(poll.interval, 3);
                    assert_eq!(poll.inner.xid, xid);
                }
                other => panic!("expected poll, got {:?}", other),
            }
        }
        assert!(link.is_tracking(&Match::all()));

        link.stop_tracking(&Match::all()).unwrap();
        assert!(!link.is_tracking(&Match::all()));
        assert_eq!(
            sink.sent.lock().last().map(|m| m.payload.clone()),
            Some(Payload::PollStop(xid))
        );
    }

    #[test]
    fn test_one_shot_not_polled() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();
        let sink = Arc::new(RecordingSink::default());

        link.track_stats(0, Match::all(), sink.clone()).unwrap();
        assert!(matches!(
            sink.sent.lock()[0].payload,
            Payload::StatRequest(StatsRequest::Aggregate(_))
        ));

        link.stop_tracking(&Match::all()).unwrap();
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[test]
    fn test_utilization() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();
        link.set_max_data_rate_bps(8000);
        assert_eq!(link.utilization(), -1.0);

        link.track_stats(1000, Match::all(), Arc::new(RecordingSink::default()))
            .unwrap();
        assert_eq!(link.utilization(), -1.0);

        let t0 = Instant::now();
        let reply = |bytes| AggregateStatsReply {
            dpid: 1,
            flags: 0,
            packet_count: 0,
            byte_count: bytes,
            flow_count: 0,
        };
        assert!(link.update_stats(&Match::all(), &reply(0), t0));
        assert!(link.update_stats(&Match::all(), &reply(500), t0 + Duration::from_secs(1)));
        assert_eq!(link.utilization(), 0.5);

        assert!(link.update_stats(&Match::all(), &reply(5500), t0 + Duration::from_secs(2)));
        assert_eq!(link.utilization(), 1.0);
    }

    #[test]
    fn test_stop_all_reports_first_error() {
        let arena = LinkArena::new();
        let (a, b) = pair();
        let link = arena.connect(&a, 1, &b, 2, LinkType::Wire).unwrap();

        link.track_stats(100, Match::all(), Arc::new(RecordingSink::default()))
            .unwrap();
        if let Some(sub) = link.stats.lock().get_mut(&Match::all()) {
            sub.sink = Arc::new(DownSink);
        }

        assert!(matches!(
            arena.disconnect(&link, Some(&a), Some(&b)),
            Err(TopologyError::Send(SessionError::NotConnected))
        ));
        assert!(!link.is_tracking(&Match::all()));
        assert!(arena.is_empty());
    }
}
