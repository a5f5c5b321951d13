//! Configuration handling for the OFG client.
//!
//! Settings come from a YAML file, then environment variables, then the
//! command line, each overriding the one before.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use ofg_handler::{Credentials, HandlerConfig};
use ofg_session::{ConnectionConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One backend to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Host name or address
    pub host: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl FromStr for BackendConfig {
    type Err = String;

    /// Parse `host` or `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty server address".to_string());
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| format!("invalid port in '{}': {}", s, e))?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            Some(_) => Err(format!("missing host in '{}'", s)),
            None => Ok(Self {
                host: s.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backends to connect to
    pub backends: Vec<BackendConfig>,
    /// Redial after a connection drops
    pub auto_reconnect: bool,
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// First reconnect delay (milliseconds)
    pub initial_backoff_ms: u64,
    /// Reconnect delay cap (milliseconds)
    pub max_backoff_ms: u64,
    /// Unanswered requests are dropped after this long (milliseconds)
    pub request_max_age_ms: u64,
    /// Subscribe to node changes
    pub subscribe_nodes: bool,
    /// Subscribe to link changes
    pub subscribe_links: bool,
    /// Subscribe to flow changes
    pub subscribe_flows: bool,
    /// Ask new switches for their links and description
    pub auto_request_link_info: bool,
    /// Collect statistics on every new link
    pub auto_track_link_stats: bool,
    /// Statistics poll period (milliseconds); 0 fetches once
    pub stats_refresh_ms: u64,
    /// Minimum gap between traffic matrix sends (milliseconds)
    pub debounce_delay_ms: u64,
    /// Reconnects allowed after rejected credentials
    pub auth_retries: u32,
    /// Username presented when a backend asks
    pub username: String,
    /// Password presented when a backend asks
    pub password: String,
    /// Fat tree size requested on first connect
    pub fat_tree_k: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let handler = HandlerConfig::default();
        let conn = ConnectionConfig::default();
        Self {
            backends: vec![BackendConfig::default()],
            auto_reconnect: conn.auto_reconnect,
            connect_timeout_ms: millis(conn.connect_timeout),
            initial_backoff_ms: millis(conn.initial_backoff),
            max_backoff_ms: millis(conn.max_backoff),
            request_max_age_ms: millis(conn.request_max_age),
            subscribe_nodes: handler.subscribe_nodes,
            subscribe_links: handler.subscribe_links,
            subscribe_flows: handler.subscribe_flows,
            auto_request_link_info: handler.auto_request_link_info,
            auto_track_link_stats: handler.auto_track_link_stats,
            stats_refresh_ms: handler.stats_refresh_ms,
            debounce_delay_ms: millis(handler.debounce_delay),
            auth_retries: handler.auth_retries,
            username: String::new(),
            password: String::new(),
            fat_tree_k: handler.fat_tree_k,
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

impl ClientConfig {
    /// Load configuration from file and environment variables
    ///
    /// A missing or unparsable file falls back to defaults with a warning.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<ClientConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());

        info!(
            "Final client configuration: backends=[{}], stats_refresh={}ms, auto_track={}",
            config
                .backends
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            config.stats_refresh_ms,
            config.auto_track_link_stats
        );

        Ok(config)
    }

    /// Apply `OFG_*` overrides looked up through `var`
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(server) = var("OFG_SERVER") {
            match server.parse::<BackendConfig>() {
                Ok(backend) => {
                    info!("Backend overridden by environment: {}", backend);
                    self.backends = vec![backend];
                }
                Err(e) => warn!("Ignoring OFG_SERVER: {}", e),
            }
        }

        if let Some(port) = var("OFG_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    for backend in &mut self.backends {
                        backend.port = port;
                    }
                    info!("Backend port overridden by environment: {}", port);
                }
                Err(e) => warn!("Ignoring OFG_PORT: {}", e),
            }
        }

        if let Some(refresh) = var("OFG_STATS_REFRESH_MS") {
            match refresh.parse::<u64>() {
                Ok(ms) => {
                    self.stats_refresh_ms = ms;
                    info!("Stats refresh overridden by environment: {}ms", ms);
                }
                Err(e) => warn!("Ignoring OFG_STATS_REFRESH_MS: {}", e),
            }
        }

        if let Some(track) = var("OFG_AUTO_TRACK") {
            match parse_flag(&track) {
                Some(on) => {
                    self.auto_track_link_stats = on;
                    info!("Auto-track overridden by environment: {}", on);
                }
                None => warn!("Ignoring OFG_AUTO_TRACK: '{}' is not a boolean", track),
            }
        }

        if let Some(username) = var("OFG_USERNAME") {
            self.username = username;
        }
        if let Some(password) = var("OFG_PASSWORD") {
            self.password = password;
        }
    }

    /// Connection settings for `backend`
    pub fn connection_config(&self, backend: &BackendConfig) -> ConnectionConfig {
        ConnectionConfig {
            host: backend.host.clone(),
            port: backend.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            auto_reconnect: self.auto_reconnect,
            request_max_age: Duration::from_millis(self.request_max_age_ms),
            ..ConnectionConfig::default()
        }
    }

    /// Handler settings
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            subscribe_nodes: self.subscribe_nodes,
            subscribe_links: self.subscribe_links,
            subscribe_flows: self.subscribe_flows,
            auto_request_link_info: self.auto_request_link_info,
            auto_track_link_stats: self.auto_track_link_stats,
            stats_refresh_ms: self.stats_refresh_ms,
            auth_retries: self.auth_retries,
            debounce_delay: Duration::from_millis(self.debounce_delay_ms),
            fat_tree_k: self.fat_tree_k,
        }
    }

    /// Credentials presented to every backend
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.backends, vec![BackendConfig::default()]);
        assert_eq!(config.backends[0].port, 2503);
        assert!(config.auto_reconnect);
        assert!(config.auto_track_link_stats);
        assert_eq!(config.stats_refresh_ms, 0);
        assert_eq!(config.auth_retries, 1);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
backends:
  - host: ctrl-a.example.net
    port: 2600
  - host: ctrl-b.example.net
subscribe_flows: true
stats_refresh_ms: 1500
username: viewer
fat_tree_k: 4
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].to_string(), "ctrl-a.example.net:2600");
        assert_eq!(config.backends[1].port, DEFAULT_PORT);
        assert!(config.subscribe_flows);
        assert!(config.subscribe_nodes);
        assert_eq!(config.stats_refresh_ms, 1500);
        assert_eq!(config.username, "viewer");
        assert_eq!(config.fat_tree_k, Some(4));

        let handler = config.handler_config();
        assert_eq!(handler.stats_refresh_ms, 1500);
        assert!(handler.subscribe_flows);
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"backends: [not: {closed").unwrap();

        let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.stats_refresh_ms, ClientConfig::default().stats_refresh_ms);
        assert!(!config.backends.is_empty());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("OFG_SERVER", "10.0.0.5"),
            ("OFG_PORT", "2700"),
            ("OFG_STATS_REFRESH_MS", "250"),
            ("OFG_AUTO_TRACK", "off"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(
            config.backends,
            vec![BackendConfig {
                host: "10.0.0.5".into(),
                port: 2700
            }]
        );
        assert_eq!(config.stats_refresh_ms, 250);
        assert!(!config.auto_track_link_stats);
    }

    #[test]
    fn test_bad_overrides_ignored() {
        let mut config = ClientConfig::default();
        config.apply_overrides(|k| match k {
            "OFG_PORT" => Some("seventy".into()),
            "OFG_AUTO_TRACK" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(config.backends[0].port, DEFAULT_PORT);
        assert!(config.auto_track_link_stats);
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(
            "example.org:99".parse::<BackendConfig>().unwrap(),
            BackendConfig {
                host: "example.org".into(),
                port: 99
            }
        );
        assert_eq!("example.org".parse::<BackendConfig>().unwrap().port, DEFAULT_PORT);
        assert!("example.org:x".parse::<BackendConfig>().is_err());
        assert!(":80".parse::<BackendConfig>().is_err());
        assert!("".parse::<BackendConfig>().is_err());
    }

    #[test]
    fn test_connection_config() {
        let config = ClientConfig {
            max_backoff_ms: 10_000,
            ..Default::default()
        };
        let conn = config.connection_config(&"h:1".parse().unwrap());
        assert_eq!(conn.host, "h");
        assert_eq!(conn.port, 1);
        assert_eq!(conn.max_backoff, Duration::from_secs(10));
    }
}
