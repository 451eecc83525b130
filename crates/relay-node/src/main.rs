//! # Relay Node
//!
//! Runs the relay service until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags and install logging
//! 2. Resolve configuration (file, environment, flags)
//! 3. Bind the primary listener and connect configured relays
//! 4. Serve; reload on SIGHUP
//! 5. Graceful shutdown

use anyhow::{Context, Result};
use clap::Parser;
use relay_gateway::RelayService;
use relay_node::{init_logging, Args};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;

    let config = args
        .resolve(|key| std::env::var(key).ok())
        .context("failed to load configuration")?;

    info!("===========================================");
    info!("  Relay Node v{}", relay_gateway::VERSION);
    info!("===========================================");

    let mut service = RelayService::with_default_connector(config)
        .context("failed to create relay service")?;
    let addr = service
        .start()
        .await
        .context("failed to start relay service")?;

    info!(addr = %addr, "Relay is running. Press Ctrl+C to stop.");
    run_until_interrupted(&mut service, &args).await?;

    service.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn run_until_interrupted(service: &mut RelayService, args: &Args) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                reload(service, args).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_until_interrupted(_service: &mut RelayService, _args: &Args) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C");
    Ok(())
}

#[cfg(unix)]
async fn reload(service: &mut RelayService, args: &Args) {
    let config = match args.resolve(|key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Keeping previous configuration");
            return;
        }
    };
    if let Err(e) = service.apply_config(config).await {
        error!(error = %e, "Failed to apply configuration");
    }
}
