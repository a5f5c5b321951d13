//! OFG topology client binary.
//!
//! Connects to one or more OFG backends, keeps a merged view of the
//! network topology they describe, and reports changes through the log
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use ofg_handler::{ConnectionHandler, StaticCredentials};
use ofg_session::Connection;
use ofg_topology::{GlobalRegistry, Topology};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod presentation;

use config::{BackendConfig, ClientConfig};
use logging::OfgLogFormatter;
use presentation::LogPresentation;

/// Topology viewer client for OFG backends
#[derive(Parser, Debug)]
#[command(name = "ofg-client", version, about = "Topology viewer client for OFG backends")]
struct Args {
    /// Backend to connect to, host[:port] (repeatable); replaces the configured list
    #[arg(long = "server")]
    servers: Vec<BackendConfig>,

    /// Configuration file path
    #[arg(long, default_value = "ofg.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Link statistics poll period, e.g. 500ms; 0s fetches once
    #[arg(long)]
    stats_refresh: Option<humantime::Duration>,

    /// Do not subscribe to node, link or flow updates
    #[arg(long)]
    no_subscribe: bool,

    /// Collect statistics on every new link
    #[arg(long)]
    auto_track: bool,

    /// How often to log a topology summary
    #[arg(long, default_value = "30s")]
    status_interval: humantime::Duration,
}

impl Args {
    fn apply_to(&self, config: &mut ClientConfig) {
        if !self.servers.is_empty() {
            config.backends = self.servers.clone();
        }
        if let Some(refresh) = self.stats_refresh {
            let refresh: Duration = refresh.into();
            config.stats_refresh_ms = refresh.as_millis().try_into().unwrap_or(u64::MAX);
        }
        if self.no_subscribe {
            config.subscribe_nodes = false;
            config.subscribe_links = false;
            config.subscribe_flows = false;
        }
        if self.auto_track {
            config.auto_track_link_stats = true;
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut env_filter = EnvFilter::new("info");
    for target in ["ofg_client", "ofg_session", "ofg_wire", "ofg_topology", "ofg_handler"] {
        env_filter = env_filter.add_directive(format!("{}={}", target, args.log_level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(OfgLogFormatter::new("ofg-client"))
        .init();

    info!("Starting OFG client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config);
    if config.backends.is_empty() {
        anyhow::bail!("No backends configured; pass --server host[:port]");
    }

    let registry = Arc::new(GlobalRegistry::new());
    let topology = Arc::new(Topology::new(
        Arc::clone(&registry),
        Arc::new(LogPresentation),
    ));
    let credentials = Arc::new(StaticCredentials::new(config.credentials()));
    let handler_config = config.handler_config();

    let mut handlers = Vec::with_capacity(config.backends.len());
    for (i, backend) in config.backends.iter().enumerate() {
        let conn = Connection::new(i as u64 + 1, config.connection_config(backend));
        let handler = Arc::new(ConnectionHandler::new(
            Arc::clone(&conn),
            Arc::clone(&topology),
            credentials.clone(),
            handler_config.clone(),
        ));
        conn.start(handler.clone());
        component_info!("session", "Connecting to {} as {}", backend, handler.owner());
        handlers.push(handler);
    }

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let status_every: Duration = args.status_interval.into();
    let mut status = tokio::time::interval(status_every.max(Duration::from_secs(1)));
    status.tick().await;

    info!("OFG client started. Waiting for events...");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    anyhow::bail!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = status.tick() => {
                let connected = handlers.iter().filter(|h| h.backend().is_connected()).count();
                component_info!(
                    "topology",
                    "{}/{} backends connected, {} nodes, {} links, {} flows",
                    connected,
                    handlers.len(),
                    topology.get_node_ids().len(),
                    registry.links().len(),
                    topology.flow_ids().len()
                );
                for handler in &handlers {
                    let stats = handler.backend().stats();
                    debug!(
                        "{}: {} msgs in, {} msgs out, {} connects, up {:?}",
                        handler.backend().addr(),
                        stats.messages_received,
                        stats.messages_sent,
                        stats.connects,
                        stats.uptime()
                    );
                }
            }
        }
    }

    topology.set_shutting_down();
    join_all(handlers.iter().map(|h| h.shutdown())).await;

    info!("OFG client shutdown complete");
    Ok(())
}
