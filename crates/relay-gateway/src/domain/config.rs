//! Relay configuration with validation.
//!
//! Loaded from TOML, then overridden from the environment. The same struct is
//! handed to [`RelayService::apply_config`](crate::RelayService::apply_config)
//! for live updates.

use crate::domain::error::RpcErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default primary listener port
pub const DEFAULT_PORT: u16 = 12525;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default requeue loop period
pub const DEFAULT_REQUEUE_INTERVAL_MS: u64 = 20_000;

/// Default pending sweeper period
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Default per-socket frame buffer
pub const DEFAULT_LINK_BUFFER: usize = 256;

/// Default maximum inbound frame size (16MB, definition files are large)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Scheme prepended to relay addresses that have none
pub const DEFAULT_RELAY_SCHEME: &str = "ws://";

/// Main relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bind address of the primary listener
    pub host: IpAddr,
    /// Primary listener port (default: 12525)
    pub port: u16,
    /// Relay addresses to keep connected
    pub relays: Vec<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Requeue loop period in milliseconds
    pub requeue_interval_ms: u64,
    /// Pending sweeper period in milliseconds
    pub sweep_interval_ms: u64,
    /// Frames buffered per socket before senders wait
    pub link_buffer: usize,
    /// Largest frame accepted from the primary
    pub max_message_size: usize,
    /// Extra error phrases on top of the built-in table
    pub error_phrases: BTreeMap<String, RpcErrorKind>,
    /// Flags for collaborators outside the relay core, passed through untouched
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            relays: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            requeue_interval_ms: DEFAULT_REQUEUE_INTERVAL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            link_buffer: DEFAULT_LINK_BUFFER,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            error_phrases: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELAY_*` overrides.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_HOST") {
            self.host = host
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("RELAY_HOST", host))?;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("RELAY_PORT", port))?;
        }
        if let Some(timeout) = lookup("RELAY_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("RELAY_TIMEOUT_MS", timeout))?;
        }
        if let Some(relays) = lookup("RELAY_ADDRESSES") {
            self.relays = relays
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_owned)
                .collect();
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "timeout_ms cannot be 0".into(),
            ));
        }

        if self.requeue_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "requeue_interval_ms cannot be 0".into(),
            ));
        }

        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "sweep_interval_ms cannot be 0".into(),
            ));
        }

        if self.link_buffer == 0 {
            return Err(ConfigError::InvalidLimit("link_buffer cannot be 0".into()));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }

        for relay in &self.relays {
            let normalized = normalize_relay_address(relay);
            if relay.trim().is_empty()
                || !(normalized.starts_with("ws://") || normalized.starts_with("wss://"))
            {
                return Err(ConfigError::InvalidRelay(relay.clone()));
            }
        }

        Ok(())
    }

    /// Primary listener bind address
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn requeue_interval(&self) -> Duration {
        Duration::from_millis(self.requeue_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Relay addresses with the default scheme applied, duplicates removed.
    pub fn normalized_relays(&self) -> Vec<String> {
        let mut relays: Vec<String> = self
            .relays
            .iter()
            .map(|r| normalize_relay_address(r))
            .collect();
        relays.sort();
        relays.dedup();
        relays
    }
}

/// Prefix `ws://` when the address carries no scheme.
pub fn normalize_relay_address(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_owned()
    } else {
        format!("{DEFAULT_RELAY_SCHEME}{address}")
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },
    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// Environment override does not parse
    #[error("invalid value for {0}: {1:?}")]
    InvalidEnv(&'static str, String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid periodic task interval
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Relay address that cannot be dialled
    #[error("invalid relay address: {0:?}")]
    InvalidRelay(String),
}
