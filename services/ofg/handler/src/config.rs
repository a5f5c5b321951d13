//! Handler settings.

use std::time::Duration;

/// Minimum gap between two traffic matrix sends
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// What a [`ConnectionHandler`](crate::ConnectionHandler) asks for and tracks
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Fetch and subscribe to nodes on connect
    pub subscribe_nodes: bool,
    /// Fetch and subscribe to links on connect
    pub subscribe_links: bool,
    /// Fetch and subscribe to flows on connect
    pub subscribe_flows: bool,
    /// Ask for the links (and description) of every new switch
    pub auto_request_link_info: bool,
    /// Start statistics collection on every new link
    pub auto_track_link_stats: bool,
    /// Statistics poll period; 0 fetches once per link
    pub stats_refresh_ms: u64,
    /// Reconnects allowed after rejected credentials before giving up
    pub auth_retries: u32,
    /// Minimum gap between traffic matrix sends
    pub debounce_delay: Duration,
    /// Fat tree size whose switches are requested on the first connect
    pub fat_tree_k: Option<u32>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            subscribe_nodes: true,
            subscribe_links: true,
            subscribe_flows: false,
            auto_request_link_info: true,
            auto_track_link_stats: true,
            stats_refresh_ms: 0,
            auth_retries: 1,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            fat_tree_k: None,
        }
    }
}
