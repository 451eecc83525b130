//! Command-line arguments.

use clap::Parser;
use relay_gateway::domain::config::ConfigError;
use relay_gateway::RelayConfig;
use std::net::IpAddr;
use std::path::PathBuf;

/// Relay between one primary JSON-RPC endpoint and any number of relay clients
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "relay-node")]
#[command(about = "JSON-RPC relay: one primary endpoint, many relay clients")]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on for the primary endpoint
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to listen on for the primary endpoint
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Relay address to connect to (repeatable); replaces configured relays
    #[arg(short, long = "relay")]
    pub relays: Vec<String>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Build the effective configuration: file, then environment, then flags.
    pub fn resolve<F>(&self, env: F) -> Result<RelayConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };
        config.apply_env(env)?;

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if !self.relays.is_empty() {
            config.relays = self.relays.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }

        config.validate()?;
        Ok(config)
    }
}
