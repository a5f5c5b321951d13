//! Rate-limited sending of "latest value wins" updates.
//!
//! Interactive controls (a slider driving a traffic-matrix request, say)
//! can generate updates far faster than the backend should see them. A
//! [`DebouncedSender`] keeps only the newest pending message and flushes it
//! `min_delay` after it was first queued, and never sooner than `min_delay`
//! after the previous flush.

use std::sync::Arc;
use std::time::Duration;

use ofg_wire::Message;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::MessageSink;

struct Shared {
    pending: Mutex<Option<Message>>,
    notify: Notify,
    cancel: CancellationToken,
}

/// Sends at most one message per `min_delay`, always the most recent one
pub struct DebouncedSender {
    shared: Arc<Shared>,
}

impl DebouncedSender {
    /// Start the flush task for `sink`
    pub fn spawn(sink: Arc<dyn MessageSink>, min_delay: Duration) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        });
        tokio::spawn(flush_loop(Arc::clone(&shared), sink, min_delay));
        Self { shared }
    }

    /// Replace the pending message with `msg`
    pub fn submit(&self, msg: Message) {
        let replaced = self.shared.pending.lock().replace(msg).is_some();
        if replaced {
            debug!("Superseded a pending debounced message");
        }
        self.shared.notify.notify_one();
    }

    /// Whether a message is waiting to be flushed
    pub fn has_pending(&self) -> bool {
        self.shared.pending.lock().is_some()
    }

    /// Stop the flush task; a pending message is discarded
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }
}

impl Drop for DebouncedSender {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

async fn flush_loop(shared: Arc<Shared>, sink: Arc<dyn MessageSink>, min_delay: Duration) {
    let mut last_flush: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = shared.notify.notified() => {}
        }

        let mut deadline = Instant::now() + min_delay;
        if let Some(last) = last_flush {
            deadline = deadline.max(last + min_delay);
        }
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let next = shared.pending.lock().take();
        if let Some(msg) = next {
            if let Err(e) = sink.send(msg) {
                warn!("Debounced send failed: {}", e);
            }
            last_flush = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionError;
    use ofg_wire::Payload;

    #[derive(Default)]
    struct Collect {
        sent: Mutex<Vec<(Instant, Message)>>,
    }

    impl MessageSink for Collect {
        fn send(&self, msg: Message) -> Result<u32, SessionError> {
            self.sent.lock().push((Instant::now(), msg));
            Ok(0)
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_value_wins() {
        let sink = Arc::new(Collect::default());
        let sender = DebouncedSender::spawn(sink.clone(), Duration::from_millis(100));
        let start = Instant::now();

        sender.submit(Message::new(Payload::EtSwitchesRequest(1)));
        sender.submit(Message::new(Payload::EtSwitchesRequest(2)));
        settle().await;
        assert!(sink.sent.lock().is_empty());
        assert!(sender.has_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;
        {
            let sent = sink.sent.lock();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1.payload, Payload::EtSwitchesRequest(2));
            assert!(sent[0].0 - start >= Duration::from_millis(100));
        }

        // burst inside the delay window collapses into the last message
        sender.submit(Message::new(Payload::EtSwitchesRequest(3)));
        sender.submit(Message::new(Payload::EtSwitchesRequest(4)));
        settle().await;
        assert_eq!(sink.sent.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.payload, Payload::EtSwitchesRequest(4));
        assert!(sent[1].0 - sent[0].0 >= Duration::from_millis(100));
        drop(sent);
        assert!(!sender.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending() {
        let sink = Arc::new(Collect::default());
        let sender = DebouncedSender::spawn(sink.clone(), Duration::from_millis(100));

        sender.submit(Message::new(Payload::EtSwitchesRequest(1)));
        settle().await;
        sender.stop();

        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;
        assert!(sink.sent.lock().is_empty());
    }
}
