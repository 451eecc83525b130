//! # Relay Node
//!
//! Command-line surface and logging setup for the `relay-node` binary.
//!
//! Configuration is layered: TOML file (`--config`), then `RELAY_*`
//! environment variables, then command-line flags.

pub mod cli;

pub use cli::Args;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`; defaults to `info`.
pub fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}
