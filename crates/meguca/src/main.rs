//! Meguca Daemon
//!
//! Loads plugins, prepares them and runs them on their schedules until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use meguca::config::load_general;
use meguca::{PluginCatalog, PluginLoader};
use meguca_runtime::scheduler::TokioScheduler;
use meguca_runtime::{Configuration, Orchestrator};

/// Meguca plugin orchestration daemon
#[derive(Parser, Debug)]
#[command(name = "meguca")]
#[command(about = "Meguca plugin orchestration daemon", long_about = None)]
struct Args {
    /// Path to the general configuration file
    #[arg(short, long, default_value = "config/meguca.toml")]
    config: PathBuf,

    /// Directory containing plugin descriptors
    #[arg(short, long, default_value = "plugins")]
    plugins: PathBuf,

    /// Run the configured dry-run plugins once and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meguca=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Meguca v{}", env!("CARGO_PKG_VERSION"));

    let general = load_general(&args.config)?;
    info!("Loaded configuration from: {}", args.config.display());

    let plugins = PluginLoader::new(PluginCatalog::with_builtins())
        .load(&args.plugins)
        .await?;
    let config = Configuration::new(general, plugins.config());

    let mut orchestrator = Orchestrator::new(Arc::new(plugins), config, TokioScheduler::new())?;
    if args.dry_run {
        orchestrator = orchestrator.with_dry_run(true);
    }

    orchestrator.prepare().await?;
    orchestrator.run().await?;

    if orchestrator.is_dry_run() {
        orchestrator.shutdown().await?;
        info!("Dry run complete");
        return Ok(());
    }

    shutdown_signal().await?;

    info!("Shutting down plugins...");
    if let Err(e) = orchestrator.shutdown().await {
        warn!("Plugins did not shut down cleanly: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            },
            _ = terminate.recv() => {
                info!("Received terminate signal, shutting down...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}
