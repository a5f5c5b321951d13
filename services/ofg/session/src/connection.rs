//! Supervised connection to one backend.
//!
//! A [`Connection`] owns a background task that dials the backend, runs the
//! read/write loop, and redials with exponential backoff when the socket
//! drops. Received messages are handed to a [`MessageProcessor`] inline, so
//! per-connection ordering is strict. Sends are synchronous: the message is
//! encoded on the caller's thread and queued for the writer.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use ofg_wire::{Message, MessageDecoder, Payload};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use crate::framing::{recv_message, send_message};
use crate::transport::connect_tcp;
use crate::xid::{XidTracker, DEFAULT_REQUEST_MAX_AGE};
use crate::SessionError;

/// Well-known backend port
pub const DEFAULT_PORT: u16 = 2503;

/// Connection settings
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Backend host name or address
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Give up on a TCP connect after this long
    pub connect_timeout: Duration,
    /// First reconnect delay
    pub initial_backoff: Duration,
    /// Reconnect delay cap
    pub max_backoff: Duration,
    /// Redial after the connection drops
    pub auto_reconnect: bool,
    /// Unanswered one-shot requests older than this are dropped
    pub request_max_age: Duration,
    /// How often old requests are scrubbed
    pub scrub_interval: Duration,
    /// How long `shutdown()` waits for the background task
    pub join_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            auto_reconnect: true,
            request_max_age: DEFAULT_REQUEST_MAX_AGE,
            scrub_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Lifecycle state, published on a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and not dialing (initial state, or between retries)
    Disconnected,
    /// Dialing the backend
    Connecting,
    /// Socket up; sends are accepted
    Connected,
    /// `shutdown()` in progress
    ShuttingDown,
}

/// Traffic counters
#[derive(Clone, Debug, Default)]
pub struct NetStats {
    /// Messages received since the connection was created
    pub messages_received: u64,
    /// Messages written since the connection was created
    pub messages_sent: u64,
    /// Bytes received
    pub bytes_in: u64,
    /// Bytes written
    pub bytes_out: u64,
    /// Successful connects
    pub connects: u64,
    /// When the current socket came up
    pub connected_since: Option<Instant>,
}

impl NetStats {
    /// Time the current socket has been up
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_since.map(|t| t.elapsed())
    }
}

/// Receives everything a connection reads
pub trait MessageProcessor: Send + Sync {
    /// Handle one decoded message
    fn process(&self, conn: &Connection, msg: Message);

    /// Called after the socket comes up (`true`) or goes down (`false`)
    fn connection_state_changed(&self, conn: &Connection, connected: bool);
}

/// Anything that can put a message on the wire
///
/// Returns the xid replies to the message will carry.
pub trait MessageSink: Send + Sync {
    /// Queue `msg` for sending
    fn send(&self, msg: Message) -> Result<u32, SessionError>;
}

/// A supervised connection to one backend
pub struct Connection {
    id: u64,
    config: ConnectionConfig,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    xids: Mutex<XidTracker>,
    stats: Mutex<NetStats>,
    cancel: CancellationToken,
    session_cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection; nothing happens until [`Connection::start`]
    pub fn new(id: u64, config: ConnectionConfig) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            id,
            config,
            state,
            outbound: Mutex::new(None),
            xids: Mutex::new(XidTracker::new()),
            stats: Mutex::new(NetStats::default()),
            cancel: CancellationToken::new(),
            session_cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        })
    }

    /// Spawn the background task that connects and reads
    pub fn start(self: &Arc<Self>, processor: Arc<dyn MessageProcessor>) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Connection to {} already started", self.addr());
            return;
        }
        let conn = Arc::clone(self);
        *task = Some(tokio::spawn(async move { conn.supervise(processor).await }));
    }

    /// Connection identity, unique per process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `host:port` of the backend
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Settings this connection was created with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether sends are currently accepted
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> NetStats {
        self.stats.lock().clone()
    }

    /// Encode `msg` and queue it for the writer
    ///
    /// A message with xid 0 is given a fresh one. Stateful requests are
    /// recorded for reply correlation. Returns the xid that replies will
    /// carry, which for a poll is the xid of the inner request.
    pub fn send(&self, mut msg: Message) -> Result<u32, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::ShuttingDown);
        }
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let outbound = self
            .outbound
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)?;

        let (reply_xid, bytes) = {
            let mut xids = self.xids.lock();
            let reply_xid = xids.assign(&mut msg);
            let bytes = msg.encode()?;
            xids.record(&msg);
            if let Payload::PollStop(polled) = msg.payload {
                xids.stop_polling(polled);
            }
            (reply_xid, bytes)
        };

        trace!(
            "Queueing {:?} (xid {}) to {}",
            msg.message_type(),
            msg.xid,
            self.addr()
        );
        outbound
            .send(bytes)
            .map_err(|_| SessionError::NotConnected)?;
        Ok(reply_xid)
    }

    /// Take the request a reply with `xid` answers
    pub fn pop_request(&self, xid: u32) -> Option<Message> {
        self.xids.lock().pop(xid)
    }

    /// Drop the current socket; the background task redials
    pub fn reconnect(&self) {
        info!("Reconnect requested for {}", self.addr());
        self.session_cancel.lock().cancel();
    }

    /// Stop the background task without waiting for it
    ///
    /// Safe to call from inside a [`MessageProcessor`] callback.
    pub fn request_shutdown(&self) {
        self.state.send_replace(ConnectionState::ShuttingDown);
        self.cancel.cancel();
    }

    /// Stop the background task, sending DISCONNECT if connected
    ///
    /// Waits up to `join_timeout` for the task to finish, then abandons it.
    pub async fn shutdown(&self) {
        info!("Shutting down connection to {}", self.addr());
        self.request_shutdown();

        let handle = self.task.lock().take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Connection task for {} stopped", self.addr()),
                Ok(Err(e)) => warn!("Connection task for {} failed: {}", self.addr(), e),
                Err(_) => {
                    warn!(
                        "Connection task for {} did not stop within {:?}",
                        self.addr(),
                        self.config.join_timeout
                    );
                    handle.abort();
                }
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn supervise(self: Arc<Self>, processor: Arc<dyn MessageProcessor>) {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.send_replace(ConnectionState::Connecting);
            info!("Attempting to connect to {}", self.addr());

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_tcp(&self.config.host, self.config.port, self.config.connect_timeout) => result,
            };

            match connected {
                Ok(stream) => {
                    backoff.reset();
                    if let Err(e) = self.run_session(stream, processor.as_ref()).await {
                        warn!("Connection to {} ended with error: {:#}", self.addr(), e);
                    }
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!("Failed to connect to {}: {}", self.addr(), e);
                }
            }

            if self.cancel.is_cancelled() || !self.config.auto_reconnect {
                break;
            }

            let delay = backoff.next_delay();
            debug!("Retrying {} in {:?}", self.addr(), delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if !self.cancel.is_cancelled() {
            self.state.send_replace(ConnectionState::Disconnected);
        }
        debug!("Connection task for {} exiting", self.addr());
    }

    async fn run_session(
        &self,
        stream: TcpStream,
        processor: &dyn MessageProcessor,
    ) -> anyhow::Result<()> {
        let peer = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        let session_cancel = self.cancel.child_token();
        *self.session_cancel.lock() = session_cancel.clone();
        *self.outbound.lock() = Some(tx);
        {
            let mut stats = self.stats.lock();
            stats.connects += 1;
            stats.connected_since = Some(Instant::now());
        }
        self.state.send_replace(ConnectionState::Connected);
        info!("Connected to {} ({})", self.addr(), peer);
        processor.connection_state_changed(self, true);

        let mut decoder = MessageDecoder::new();
        let mut buffer = BytesMut::with_capacity(64 * 1024);
        let mut scrub = tokio::time::interval(self.config.scrub_interval);
        scrub.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                _ = session_cancel.cancelled() => {
                    if self.cancel.is_cancelled() {
                        while let Ok(bytes) = rx.try_recv() {
                            if writer.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        if let Err(e) = send_message(&mut writer, &Message::new(Payload::Disconnect)).await {
                            debug!("Could not send DISCONNECT to {}: {}", peer, e);
                        }
                        let _ = writer.shutdown().await;
                        info!("Disconnected from {}", peer);
                    } else {
                        info!("Dropping connection to {}", peer);
                    }
                    break Ok(());
                }

                Some(bytes) = rx.recv() => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        error!("Failed to write to {}: {}", peer, e);
                        break Err(e.into());
                    }
                    let mut stats = self.stats.lock();
                    stats.messages_sent += 1;
                    stats.bytes_out += bytes.len() as u64;
                }

                _ = scrub.tick() => {
                    self.xids
                        .lock()
                        .expire(std::time::Instant::now(), self.config.request_max_age);
                }

                received = recv_message(&mut reader, &mut decoder, &mut buffer) => {
                    let msg = match received {
                        Ok(msg) => msg,
                        Err(e) => break Err(e),
                    };
                    {
                        let mut stats = self.stats.lock();
                        stats.messages_received += 1;
                        stats.bytes_in += msg.length() as u64;
                    }
                    trace!("Received {:?} (xid {}) from {}", msg.message_type(), msg.xid, peer);

                    let closing = matches!(msg.payload, Payload::Disconnect);
                    processor.process(self, msg);
                    if closing {
                        info!("Backend {} closed the connection", peer);
                        break Ok(());
                    }
                }
            }
        };

        *self.outbound.lock() = None;
        self.xids.lock().clear();
        self.stats.lock().connected_since = None;
        if !self.cancel.is_cancelled() {
            self.state.send_replace(ConnectionState::Disconnected);
        }
        processor.connection_state_changed(self, false);
        result
    }
}

impl MessageSink for Connection {
    fn send(&self, msg: Message) -> Result<u32, SessionError> {
        Connection::send(self, msg)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr())
            .field("state", &self.state())
            .finish()
    }
}
