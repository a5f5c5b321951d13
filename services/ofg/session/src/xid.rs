//! Transaction id allocation and stateful-request correlation.
//!
//! Replies to statistics requests carry only the xid of the request that
//! caused them, so the request has to be remembered until its reply shows
//! up. Polled requests are answered repeatedly and stay recorded until the
//! poll is stopped; one-shot requests are forgotten on first reply or when
//! they grow too old.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ofg_wire::{Message, Payload};
use tracing::{debug, trace};

/// Default age after which an unanswered one-shot request is dropped
pub const DEFAULT_REQUEST_MAX_AGE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Outstanding {
    request: Message,
    sent_at: Instant,
}

/// Per-connection xid counter and request table
#[derive(Debug)]
pub struct XidTracker {
    next_xid: u32,
    one_shot: HashMap<u32, Outstanding>,
    polling: HashMap<u32, Message>,
}

impl XidTracker {
    /// Create an empty tracker; the first allocated xid is 1
    pub fn new() -> Self {
        Self {
            next_xid: 1,
            one_shot: HashMap::new(),
            polling: HashMap::new(),
        }
    }

    /// Allocate the next transaction id, never returning 0
    pub fn next_xid(&mut self) -> u32 {
        if self.next_xid == 0 {
            self.next_xid = 1;
        }
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    /// Give `msg` (and the inner request of a poll) an xid if it has none
    ///
    /// Returns the xid replies will carry: the inner xid for a poll, the
    /// message's own xid otherwise.
    pub fn assign(&mut self, msg: &mut Message) -> u32 {
        if msg.xid == 0 {
            msg.xid = self.next_xid();
        }
        if let Payload::PollStart(poll) = &mut msg.payload {
            if poll.inner.xid == 0 {
                poll.inner.xid = self.next_xid();
            }
            return poll.inner.xid;
        }
        msg.xid
    }

    /// Remember a stateful request so its reply can be correlated
    ///
    /// Non-stateful messages are ignored.
    pub fn record(&mut self, msg: &Message) {
        self.record_at(msg, Instant::now());
    }

    fn record_at(&mut self, msg: &Message, now: Instant) {
        if !msg.is_stateful() {
            return;
        }

        match &msg.payload {
            Payload::PollStart(poll) if poll.interval > 0 => {
                trace!("Recording polled request xid {}", poll.inner.xid);
                self.polling.insert(poll.inner.xid, (*poll.inner).clone());
            }
            Payload::PollStart(poll) => {
                self.one_shot.insert(
                    poll.inner.xid,
                    Outstanding {
                        request: (*poll.inner).clone(),
                        sent_at: now,
                    },
                );
            }
            _ => {
                trace!("Recording one-shot request xid {}", msg.xid);
                self.one_shot.insert(
                    msg.xid,
                    Outstanding {
                        request: msg.clone(),
                        sent_at: now,
                    },
                );
            }
        }
    }

    /// Look up the request a reply with `xid` answers
    ///
    /// Polling entries are returned by clone and kept; one-shot entries are
    /// removed so a second lookup returns `None`.
    pub fn pop(&mut self, xid: u32) -> Option<Message> {
        if let Some(request) = self.polling.get(&xid) {
            return Some(request.clone());
        }
        self.one_shot.remove(&xid).map(|o| o.request)
    }

    /// Forget a polled request; called when POLL_STOP is sent for it
    pub fn stop_polling(&mut self, xid: u32) -> bool {
        self.polling.remove(&xid).is_some()
    }

    /// Drop one-shot requests older than `max_age`, returning how many went
    pub fn expire(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.one_shot.len();
        self.one_shot
            .retain(|_, o| now.saturating_duration_since(o.sent_at) <= max_age);
        let expired = before - self.one_shot.len();
        if expired > 0 {
            debug!("Expired {} unanswered request(s)", expired);
        }
        expired
    }

    /// Forget every outstanding and polling request
    pub fn clear(&mut self) {
        self.one_shot.clear();
        self.polling.clear();
    }

    /// Number of one-shot requests awaiting a reply
    pub fn outstanding_len(&self) -> usize {
        self.one_shot.len()
    }

    /// Number of active polls
    pub fn polling_len(&self) -> usize {
        self.polling.len()
    }
}

impl Default for XidTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofg_wire::{AggregateStatsRequest, Match, PollStart, StatsRequest};

    fn aggregate(dpid: u64) -> Message {
        Message::new(Payload::StatRequest(StatsRequest::Aggregate(
            AggregateStatsRequest::new(dpid, 1, Match::all()),
        )))
    }

    #[test]
    fn test_xid_skips_zero_on_wrap() {
        let mut tracker = XidTracker::new();
        assert_eq!(tracker.next_xid(), 1);

        tracker.next_xid = u32::MAX;
        assert_eq!(tracker.next_xid(), u32::MAX);
        assert_eq!(tracker.next_xid(), 1);
    }

    #[test]
    fn test_one_shot_pop_is_idempotent() {
        let mut tracker = XidTracker::new();
        let mut req = aggregate(1);
        let xid = tracker.assign(&mut req);
        tracker.record(&req);

        assert_eq!(tracker.pop(xid), Some(req));
        assert_eq!(tracker.pop(xid), None);
    }

    #[test]
    fn test_polling_entry_survives_pop() {
        let mut tracker = XidTracker::new();
        let mut poll = Message::new(Payload::PollStart(PollStart {
            interval: 10,
            inner: Box::new(aggregate(7)),
        }));
        let inner_xid = tracker.assign(&mut poll);
        assert_ne!(inner_xid, poll.xid);
        tracker.record(&poll);

        assert!(tracker.pop(inner_xid).is_some());
        assert!(tracker.pop(inner_xid).is_some());
        assert_eq!(tracker.polling_len(), 1);

        assert!(tracker.stop_polling(inner_xid));
        assert_eq!(tracker.pop(inner_xid), None);
    }

    #[test]
    fn test_non_stateful_not_recorded() {
        let mut tracker = XidTracker::new();
        let mut echo = Message::new(Payload::EchoRequest);
        let xid = tracker.assign(&mut echo);
        tracker.record(&echo);
        assert_eq!(tracker.pop(xid), None);
    }

    #[test]
    fn test_expire_old_requests() {
        let mut tracker = XidTracker::new();
        let start = Instant::now();

        let mut old = aggregate(1);
        tracker.assign(&mut old);
        tracker.record_at(&old, start);

        let mut fresh = aggregate(2);
        let fresh_xid = tracker.assign(&mut fresh);
        tracker.record_at(&fresh, start + Duration::from_secs(2));

        let expired = tracker.expire(start + Duration::from_secs(3), DEFAULT_REQUEST_MAX_AGE);
        assert_eq!(expired, 1);
        assert_eq!(tracker.outstanding_len(), 1);
        assert!(tracker.pop(fresh_xid).is_some());
    }

    #[test]
    fn test_clear() {
        let mut tracker = XidTracker::new();
        let mut req = aggregate(1);
        tracker.assign(&mut req);
        tracker.record(&req);
        let mut poll = Message::new(Payload::PollStart(PollStart {
            interval: 1,
            inner: Box::new(aggregate(2)),
        }));
        tracker.assign(&mut poll);
        tracker.record(&poll);

        tracker.clear();
        assert_eq!(tracker.outstanding_len(), 0);
        assert_eq!(tracker.polling_len(), 0);
    }
}
