use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drain::DrainPolicy;

/// Configuration for one cluster node running the update service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This node's stable cluster identity, as it appears in `peers`.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Cluster membership in report order, including this node.
    #[serde(default)]
    pub peers: Vec<String>,

    #[serde(default = "default_peer_scheme")]
    pub peer_scheme: String,

    /// Release channel used when an update request carries no source URL.
    #[serde(default = "default_release_url")]
    pub release_url: String,

    #[serde(default)]
    pub binary_path: Option<String>,

    #[serde(default = "default_service_name")]
    pub systemd_service_name: String,

    #[serde(default)]
    pub drives: Vec<String>,

    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,

    #[serde(default = "default_drain_wait_secs")]
    pub drain_wait_secs: u64,

    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,

    #[serde(default = "default_drain_poll_max_interval_ms")]
    pub drain_poll_max_interval_ms: u64,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_addr: default_listen_addr(),
            peers: Vec::new(),
            peer_scheme: default_peer_scheme(),
            release_url: default_release_url(),
            binary_path: None,
            systemd_service_name: default_service_name(),
            drives: Vec::new(),
            peer_timeout_secs: default_peer_timeout_secs(),
            drain_wait_secs: default_drain_wait_secs(),
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
            drain_poll_max_interval_ms: default_drain_poll_max_interval_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_peer_scheme() -> String {
    "http".to_string()
}

fn default_release_url() -> String {
    "https://dl.cluster-update.dev/release/linux-amd64/cluster-update.tar.gz".to_string()
}

fn default_service_name() -> String {
    "cluster-update.service".to_string()
}

fn default_peer_timeout_secs() -> u64 {
    15 * 60
}

fn default_drain_wait_secs() -> u64 {
    5 * 60
}

fn default_drain_poll_interval_ms() -> u64 {
    250
}

fn default_drain_poll_max_interval_ms() -> u64 {
    5_000
}

fn default_restart_delay_ms() -> u64 {
    1_000
}

impl Config {
    /// Ordered, de-duplicated membership. This node is always a member.
    pub fn membership(&self) -> Vec<String> {
        let own = self.host.trim();
        let mut hosts: Vec<String> = Vec::new();
        for peer in &self.peers {
            let peer = peer.trim();
            if peer.is_empty() || hosts.iter().any(|existing| existing == peer) {
                continue;
            }
            hosts.push(peer.to_string());
        }
        if !own.is_empty() && !hosts.iter().any(|existing| existing == own) {
            hosts.push(own.to_string());
        }
        hosts
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy {
            max_wait: Duration::from_secs(self.drain_wait_secs),
            poll_interval: Duration::from_millis(self.drain_poll_interval_ms.max(1)),
            max_poll_interval: Duration::from_millis(
                self.drain_poll_max_interval_ms
                    .max(self.drain_poll_interval_ms)
                    .max(1),
            ),
        }
    }
}
