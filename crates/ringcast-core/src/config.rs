//! Configuration system for ringcast.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RINGCAST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ringcast/config.toml
//!   3. ~/.config/ringcast/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::message::NodeId;
use crate::wire::DEFAULT_PORT;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingcastConfig {
    pub node: NodeConfig,
    pub peers: Vec<PeerConfig>,
    pub store: StoreConfig,
    pub generator: GeneratorConfig,
    pub session: SessionConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's 4-digit id.
    pub id: NodeId,
    /// Replication port, shared by the listener and by peers dialling in.
    pub port: u16,
    /// Address the listener binds to.
    pub listen_addr: IpAddr,
}

/// One statically known peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    /// Explicit address. When absent the id is mapped to 10.0.XX.YY.
    #[serde(default)]
    pub addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Slots per ring store. Both the outgoing store and the inbox use it.
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Disable to run as a pure relay.
    pub enabled: bool,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Payload text of generated messages. `{id}` expands to the node id.
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    /// Applies to every single send or receive inside a session.
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Directory for sessions.log and inbox.log.
    pub dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RingcastConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            peers: Vec::new(),
            store: StoreConfig::default(),
            generator: GeneratorConfig::default(),
            session: SessionConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: NodeId::default(),
            port: DEFAULT_PORT,
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: 2000 }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 30,
            max_interval_secs: 120,
            payload: "New message from {id}".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            io_timeout_ms: 10_000,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: data_dir(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl GeneratorConfig {
    /// Payload with `{id}` substituted.
    pub fn payload_for(&self, id: &NodeId) -> String {
        self.payload.replace("{id}", &id.as_str())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("ringcast")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("ringcast")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RingcastConfig {
    /// Load config: env vars → file → defaults. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RingcastConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RINGCAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RingcastConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Ids of all configured peers, excluding this node.
    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.peers
            .iter()
            .map(|p| p.id)
            .filter(|id| *id != self.node.id)
            .collect()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.node.listen_addr, self.node.port)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.capacity == 0 {
            return Err(ConfigError::Invalid("store.capacity must be > 0".into()));
        }
        if self.generator.min_interval_secs > self.generator.max_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "generator.min_interval_secs ({}) exceeds max_interval_secs ({})",
                self.generator.min_interval_secs, self.generator.max_interval_secs
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.id) {
                return Err(ConfigError::Invalid(format!("duplicate peer id {}", peer.id)));
            }
        }
        Ok(())
    }

    /// Apply RINGCAST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RINGCAST_NODE__ID") {
            if let Ok(id) = v.parse() {
                self.node.id = id;
            }
        }
        if let Ok(v) = std::env::var("RINGCAST_NODE__PORT") {
            if let Ok(p) = v.parse() {
                self.node.port = p;
            }
        }
        if let Ok(v) = std::env::var("RINGCAST_AUDIT__ENABLED") {
            self.audit.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("RINGCAST_GENERATOR__ENABLED") {
            self.generator.enabled = v == "true" || v == "1";
        }
    }
}
