//! Protocol logic for one backend connection.
//!
//! A [`ConnectionHandler`] turns what a backend says into topology changes
//! and answers the backend's own requests (echo, authentication). It is the
//! [`MessageProcessor`] installed on a [`Connection`], so every callback
//! runs on that connection's read task, one message at a time.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use ofg_session::{Connection, DebouncedSender, MessageProcessor, MessageSink, SessionError};
use ofg_topology::{ConnectionId, HasPorts, LinkId, Node, NodeKind, RemoveStatus, Topology, TopologyError};
use ofg_wire::{
    AggregateStatsReply, AuthReply, AuthRequest, AuthStatus, AuthType, Flow, LinkFailure,
    LinkRecord, LinkSpec, LinkUtil, LinksRequest, Match, Message, NodeRecord, Payload, Request,
    RequestType, StatsReply, StatsRequest, SwitchFailure, TrafficMatrix, WireError, ANY_TYPE,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::backend::Backend;
use crate::config::HandlerConfig;
use crate::credentials::CredentialProvider;

/// Shortest salt an authentication request may carry
pub const MIN_SALT_LEN: usize = 20;

/// Drives the topology from one backend connection
pub struct ConnectionHandler<B: Backend = Connection> {
    backend: Arc<B>,
    owner: ConnectionId,
    topology: Arc<Topology>,
    credentials: Arc<dyn CredentialProvider>,
    config: HandlerConfig,
    subscribe_nodes: AtomicBool,
    subscribe_links: AtomicBool,
    subscribe_flows: AtomicBool,
    auth_failures: AtomicU32,
    first_connection: AtomicBool,
    fat_tree_k: Mutex<Option<u32>>,
    traffic_matrix: Mutex<Option<DebouncedSender>>,
}

impl<B: Backend> ConnectionHandler<B> {
    /// Handler feeding `topology` from `backend`
    pub fn new(
        backend: Arc<B>,
        topology: Arc<Topology>,
        credentials: Arc<dyn CredentialProvider>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            owner: ConnectionId(backend.connection_id()),
            backend,
            topology,
            credentials,
            subscribe_nodes: AtomicBool::new(config.subscribe_nodes),
            subscribe_links: AtomicBool::new(config.subscribe_links),
            subscribe_flows: AtomicBool::new(config.subscribe_flows),
            auth_failures: AtomicU32::new(0),
            first_connection: AtomicBool::new(true),
            fat_tree_k: Mutex::new(config.fat_tree_k),
            traffic_matrix: Mutex::new(None),
            config,
        }
    }

    /// Owner tag used for everything this connection adds
    pub fn owner(&self) -> ConnectionId {
        self.owner
    }

    /// The connection
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The view this handler updates
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Settings
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Whether node changes are subscribed to
    pub fn subscribe_nodes(&self) -> bool {
        self.subscribe_nodes.load(Ordering::Relaxed)
    }

    /// Whether link changes are subscribed to
    pub fn subscribe_links(&self) -> bool {
        self.subscribe_links.load(Ordering::Relaxed)
    }

    /// Whether flow changes are subscribed to
    pub fn subscribe_flows(&self) -> bool {
        self.subscribe_flows.load(Ordering::Relaxed)
    }

    /// Subscribe to or unsubscribe from node changes
    ///
    /// Sends a request only when the setting changes and the connection
    /// is up; otherwise the setting applies on the next connect.
    pub fn set_subscribe_nodes(&self, on: bool) -> Result<(), SessionError> {
        self.set_subscription(&self.subscribe_nodes, on, |rt| {
            Payload::NodesRequest(Request::nodes(rt))
        })
    }

    /// Subscribe to or unsubscribe from link changes
    pub fn set_subscribe_links(&self, on: bool) -> Result<(), SessionError> {
        self.set_subscription(&self.subscribe_links, on, |rt| {
            Payload::LinksRequest(LinksRequest::all(rt))
        })
    }

    /// Subscribe to or unsubscribe from flow changes
    pub fn set_subscribe_flows(&self, on: bool) -> Result<(), SessionError> {
        self.set_subscription(&self.subscribe_flows, on, |rt| {
            Payload::FlowsRequest(flows_request(rt))
        })
    }

    fn set_subscription(
        &self,
        flag: &AtomicBool,
        on: bool,
        request: impl Fn(RequestType) -> Payload,
    ) -> Result<(), SessionError> {
        if flag.swap(on, Ordering::Relaxed) == on {
            return Ok(());
        }
        if !self.backend.is_connected() {
            return Ok(());
        }
        self.backend
            .send(Message::new(request(RequestType::subscription(on))))
            .map(|_| ())
    }

    /// Ask the backend to generate `tm`
    ///
    /// Rapid successive calls are coalesced; only the newest matrix is
    /// sent, `debounce_delay` after it was queued and no sooner than that
    /// after the previous one. A
    /// change of fat tree size drops this connection's topology and asks
    /// for the switches of the new tree. Must be called from within a Tokio
    /// runtime.
    pub fn send_traffic_matrix(&self, tm: TrafficMatrix) -> Result<(), WireError> {
        tm.validate()?;

        let previous_k = self.fat_tree_k.lock().replace(tm.k);
        if previous_k.is_some_and(|k| k != tm.k) {
            info!("Fat tree size changed to k={}, refetching switches", tm.k);
            self.topology.remove_all(self.owner);
            self.send("switches request", Payload::EtSwitchesRequest(tm.k));
        }

        let mut sender = self.traffic_matrix.lock();
        let sender = sender.get_or_insert_with(|| {
            let sink: Arc<dyn MessageSink> = self.backend.clone();
            DebouncedSender::spawn(sink, self.config.debounce_delay)
        });
        sender.submit(Message::new(Payload::EtTrafficMatrix(tm)));
        Ok(())
    }

    /// Mark a switch failed (or repaired) and tell the backend
    pub fn set_switch_failed(&self, dpid: u64, failed: bool) -> Result<(), SessionError> {
        match self.topology.get_node(dpid) {
            Some(node) => node.set_failed(failed),
            None => self.topology.log_node_missing("switch failure", "failed", dpid),
        }
        self.backend
            .send(Message::new(Payload::EtSwitchFailures(SwitchFailure { dpid, failed })))
            .map(|_| ())
    }

    /// Mark a link failed (or repaired) and tell the backend
    pub fn set_link_failed(&self, link: &LinkRecord, failed: bool) -> Result<(), SessionError> {
        let id = LinkId::from(link);
        match self.topology.get_link(&id) {
            Some(l) => l.set_failed(failed),
            None => self.topology.log_link_missing("link failure", &id),
        }
        self.backend
            .send(Message::new(Payload::EtLinkFailures(LinkFailure {
                link: *link,
                failed,
            })))
            .map(|_| ())
    }

    /// Stop the connection from any context, without waiting for it
    pub fn request_shutdown(&self) {
        self.topology.set_shutting_down();
        self.stop_traffic_matrix();
        self.backend.request_shutdown();
    }

    fn stop_traffic_matrix(&self) {
        if let Some(sender) = self.traffic_matrix.lock().take() {
            sender.stop();
        }
    }

    fn send(&self, what: &str, payload: Payload) {
        if let Err(e) = self.backend.send(Message::new(payload)) {
            warn!("Unable to send {} to {}: {}", what, self.backend.server(), e);
        }
    }

    /// React to the socket coming up or going down
    pub fn handle_state_change(&self, connected: bool) {
        if !connected {
            debug!("{} disconnected, removing its topology", self.owner);
            self.topology.remove_all(self.owner);
            return;
        }

        info!("Connected to {}", self.backend.server());
        if self.subscribe_nodes() {
            self.send("nodes request", Payload::NodesRequest(Request::nodes(RequestType::OneTime)));
            self.send("nodes subscription", Payload::NodesRequest(Request::nodes(RequestType::Subscribe)));
        }
        if self.subscribe_links() {
            self.send("links request", Payload::LinksRequest(LinksRequest::all(RequestType::OneTime)));
            self.send("links subscription", Payload::LinksRequest(LinksRequest::all(RequestType::Subscribe)));
        }
        if self.subscribe_flows() {
            self.send("flows request", Payload::FlowsRequest(flows_request(RequestType::OneTime)));
            self.send("flows subscription", Payload::FlowsRequest(flows_request(RequestType::Subscribe)));
        }

        if self.first_connection.swap(false, Ordering::Relaxed) {
            if let Some(k) = *self.fat_tree_k.lock() {
                self.send("switches request", Payload::EtSwitchesRequest(k));
            }
        }
    }

    /// Handle one message from the backend
    pub fn handle_message(&self, msg: Message) {
        trace!("{} <- {:?} (xid {})", self.owner, msg.message_type(), msg.xid);
        match &msg.payload {
            Payload::Disconnect => info!("{} closed the connection", self.backend.server()),
            Payload::AuthRequest(req) => self.on_auth_request(msg.xid, req),
            Payload::AuthStatus(status) => self.on_auth_status(status),
            Payload::EchoRequest => {
                if let Err(e) = self.backend.send(Message::with_xid(msg.xid, Payload::EchoReply)) {
                    warn!("Failed to send echo reply: {}", e);
                }
            }
            Payload::EchoReply => debug!("Received echo reply (xid {})", msg.xid),
            Payload::NodesAdd(nodes) => self.on_nodes_add(nodes),
            Payload::NodesDelete(nodes) => self.on_nodes_delete(nodes),
            Payload::LinksAdd(links) => self.on_links_add(links),
            Payload::LinksDelete(links) => self.on_links_delete(links),
            Payload::FlowsAdd(flows) => self.on_flows_add(flows),
            Payload::FlowsDelete(flows) => {
                for flow in flows {
                    if !self.topology.remove_flows(flow.flow_id) {
                        debug!("Flow {} was not present", flow.flow_id);
                    }
                }
            }
            Payload::StatReply(reply) => self.on_stat_reply(msg.xid, reply),
            Payload::EtLinkUtils(utils) => self.on_link_utils(utils),
            Payload::EtSwitchesOff(nodes) => self.on_switches_off(nodes),
            Payload::ExPowerUsage(_)
            | Payload::EtPowerUsage(_)
            | Payload::EtBandwidth(_)
            | Payload::EtLatency(_)
            | Payload::EtComputationDone(_) => {
                self.topology.presentation().extension_received(&msg);
            }
            Payload::AuthReply(_)
            | Payload::PollStart(_)
            | Payload::PollStop(_)
            | Payload::NodesRequest(_)
            | Payload::LinksRequest(_)
            | Payload::FlowsRequest(_)
            | Payload::StatRequest(_)
            | Payload::EtSwitchesRequest(_)
            | Payload::EtSwitchFailures(_)
            | Payload::EtLinkFailures(_)
            | Payload::EtTrafficMatrix(_) => {
                warn!("Received unexpected message type {:?}", msg.message_type());
            }
        }
    }

    fn on_auth_request(&self, xid: u32, req: &AuthRequest) {
        if req.auth_type != AuthType::PlainText {
            warn!("Ignoring authentication request with unsupported scheme {:?}", req.auth_type);
            return;
        }
        if req.salt.len() < MIN_SALT_LEN {
            warn!(
                "Ignoring an authentication request with an insufficiently long salt ({}B)",
                req.salt.len()
            );
            return;
        }

        let server = self.backend.server();
        let creds = self.credentials.get_credentials(&server);
        let reply = AuthReply::new(creds.username, creds.password);
        if let Err(e) = self.backend.send(Message::with_xid(xid, Payload::AuthReply(reply))) {
            warn!("Failed to send an authentication reply: {}", e);
        }
    }

    fn on_auth_status(&self, status: &AuthStatus) {
        let server = self.backend.server();
        if status.ok {
            self.auth_failures.store(0, Ordering::Relaxed);
            info!("Authenticated with {}", server);
            return;
        }

        self.credentials.authentication_failed(&server, &status.message);
        let failures = self.auth_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures <= self.config.auth_retries {
            warn!("{} refused authentication, reconnecting (attempt {})", server, failures);
            self.backend.reconnect();
        } else {
            error!("{} refused authentication {} times, giving up", server, failures);
            self.request_shutdown();
        }
    }

    fn on_nodes_add(&self, nodes: &[NodeRecord]) {
        for rec in nodes {
            let kind = NodeKind::from(rec.node_type);
            let outcome = self
                .topology
                .add_node_detailed(self.owner, Node::new(rec.id, kind));
            if !kind.is_switch() || !self.config.auto_request_link_info || !outcome.local_new {
                continue;
            }

            self.send("links request", Payload::LinksRequest(LinksRequest::from_node(RequestType::OneTime, *rec)));
            if outcome.global_new {
                self.send(
                    "switch description request",
                    Payload::StatRequest(StatsRequest::Description { dpid: rec.id }),
                );
            }
        }
    }

    fn on_nodes_delete(&self, nodes: &[NodeRecord]) {
        for rec in nodes {
            if self.topology.remove_node(self.owner, rec.id) == RemoveStatus::NotPresent {
                self.topology.log_node_missing("NodesDelete", "deleted", rec.id);
            }
        }
    }

    fn on_links_add(&self, links: &[LinkSpec]) {
        for spec in links {
            let link = match self.topology.add_link(self.owner, spec) {
                Ok(link) => link,
                Err(TopologyError::LinkAlreadyExists(dup)) => {
                    trace!("{} already known", dup.existing.id());
                    continue;
                }
                Err(TopologyError::SourceMissing(id)) => {
                    self.topology.log_node_missing("LinksAdd", "src", id);
                    continue;
                }
                Err(TopologyError::DestinationMissing(id)) => {
                    self.topology.log_node_missing("LinksAdd", "dst", id);
                    continue;
                }
                Err(e) => {
                    warn!("Unable to add link {}: {}", LinkId::from(&spec.link), e);
                    continue;
                }
            };

            if !self.config.auto_track_link_stats {
                continue;
            }
            let src_is_switch = self
                .topology
                .get_node(spec.link.src.id)
                .is_some_and(|n| n.kind().is_switch());
            if !src_is_switch {
                continue;
            }

            let sink: Arc<dyn MessageSink> = self.backend.clone();
            if let Err(e) = link.track_stats(self.config.stats_refresh_ms, Match::all(), sink) {
                warn!("Unable to set up utilization polling for {}: {}", link.id(), e);
            }
        }
    }

    fn on_links_delete(&self, links: &[LinkRecord]) {
        for rec in links {
            let result = self.topology.disconnect_link(
                self.owner,
                rec.src.id,
                rec.src_port,
                rec.dst.id,
                rec.dst_port,
            );
            match result {
                Ok(()) => {}
                Err(TopologyError::Send(e)) => {
                    debug!("Link {} removed but its stats could not be stopped: {}", LinkId::from(rec), e);
                }
                Err(e) => {
                    debug!("Link delete failed: {}", e);
                    self.topology.log_link_missing("LinksDelete", &LinkId::from(rec));
                }
            }
        }
    }

    fn on_flows_add(&self, flows: &[Flow]) {
        for flow in flows {
            if !self.topology.has_node(flow.src.id) {
                self.topology.log_node_missing("FlowsAdd", "src", flow.src.id);
                continue;
            }
            if !self.topology.has_node(flow.dst.id) {
                self.topology.log_node_missing("FlowsAdd", "dst", flow.dst.id);
                continue;
            }

            let mut flow = flow.clone();
            flow.path.retain(|hop| {
                let known = self.topology.has_node(hop.node.id);
                if !known {
                    self.topology.log_node_missing("FlowsAdd", "hop", hop.node.id);
                }
                known
            });
            self.topology.add_flow(self.owner, flow);
        }
    }

    fn on_stat_reply(&self, xid: u32, reply: &StatsReply) {
        match reply {
            StatsReply::Aggregate(agg) => self.on_aggregate_stats(xid, agg),
            StatsReply::Description { dpid, desc, .. } => {
                if !self.topology.set_switch_description(*dpid, desc.clone()) {
                    self.topology.log_node_missing("switch description", "described", *dpid);
                }
            }
            StatsReply::Other { header, .. } => {
                warn!("Unhandled stats type received: {:?}", header.stats_type);
            }
        }
    }

    fn on_aggregate_stats(&self, xid: u32, reply: &AggregateStatsReply) {
        let req = match self.backend.pop_request(xid).map(|m| m.payload) {
            Some(Payload::StatRequest(StatsRequest::Aggregate(req))) => req,
            other => {
                warn!(
                    "Matching request for aggregate stats reply (xid {}) is not an aggregate stats request (got {:?})",
                    xid, other
                );
                return;
            }
        };

        let Some(node) = self.topology.get_node(req.dpid) else {
            warn!("Received aggregate stats reply for unknown switch {:#x}", req.dpid);
            return;
        };
        let Some(link) = node
            .link_from(req.out_port)
            .and_then(|id| self.topology.get_link(&id))
        else {
            warn!(
                "Received aggregate stats reply for disconnected port {} on switch {:#x}",
                req.out_port, req.dpid
            );
            return;
        };

        self.topology.update_link_stats(&link, &req.matcher, reply);
    }

    fn on_link_utils(&self, utils: &[LinkUtil]) {
        let mut total_bps = 0.0;
        for lu in utils {
            let id = LinkId::from(&lu.link);
            let Some(link) = self.topology.get_link(&id) else {
                self.topology.log_link_missing("link utilization", &id);
                continue;
            };
            let util = f64::from(lu.util);
            if self.topology.set_link_utilization(&id, util).is_ok() {
                total_bps += util.clamp(0.0, 1.0) * link.max_data_rate_bps();
            }
        }
        debug!("Backend expects {:.0} bps aggregate throughput", total_bps);
    }

    fn on_switches_off(&self, nodes: &[NodeRecord]) {
        for id in self.topology.get_node_ids() {
            if let Some(node) = self.topology.get_node(id) {
                node.set_off(false);
            }
        }
        for rec in nodes {
            match self.topology.get_node(rec.id) {
                Some(node) => node.set_off(true),
                None => self.topology.log_node_missing("switches off", "powered down", rec.id),
            }
        }
    }
}

impl ConnectionHandler<Connection> {
    /// Stop the connection, sending DISCONNECT, and wait for it to finish
    pub async fn shutdown(&self) {
        self.topology.set_shutting_down();
        self.stop_traffic_matrix();
        self.backend.shutdown().await;
    }
}

impl<B: Backend> MessageProcessor for ConnectionHandler<B> {
    fn process(&self, _conn: &Connection, msg: Message) {
        self.handle_message(msg);
    }

    fn connection_state_changed(&self, _conn: &Connection, connected: bool) {
        self.handle_state_change(connected);
    }
}

impl<B: Backend> std::fmt::Debug for ConnectionHandler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("owner", &self.owner)
            .field("server", &self.backend.server())
            .field("config", &self.config)
            .finish()
    }
}

fn flows_request(request_type: RequestType) -> Request {
    Request {
        request_type,
        object_type: ANY_TYPE,
    }
}
