//! meshnode daemon
//!
//! Derives the node identity from the configured secret key, registers the
//! built-in services and supervises them until shutdown.

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshnode_common::{LocalNode, SecretKey};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod nettable;

use config::DaemonConfig;
use nettable::NetTable;

#[derive(Parser)]
#[command(name = "meshnoded")]
#[command(about = "meshnode daemon - encrypted overlay mesh node")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "meshnode.toml")]
    config: PathBuf,

    /// Hex-encoded secret key (overrides the config file)
    #[arg(long, env = "MESHNODE_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Seconds to wait for services after a stop request
    #[arg(long)]
    shutdown_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node (default)
    Run,

    /// Generate a new secret key and print it
    Keygen,

    /// Print the identity derived from the configured secret key
    Identity {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(secret_key) = cli.secret_key {
        config.node.secret_key = secret_key;
    }
    if let Some(seconds) = cli.shutdown_timeout {
        config.shutdown_timeout_secs = seconds;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Keygen => {
            println!("{}", SecretKey::generate().to_hex());
            Ok(())
        }
        Command::Identity { json } => {
            let identity = meshnode_common::derive(&config.node.secret_key)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                println!("network id:    {}", identity.network_id);
                println!("address block: {}", identity.address_block);
                println!("public key:    {}", identity.public_key);
            }
            Ok(())
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("meshnode daemon v{}", meshnode_common::VERSION);

    let mut builder = LocalNode::builder(config.node.clone());
    if config.services.nettable {
        builder = builder.service(Arc::new(NetTable::new(config.nettable.clone())));
    }
    let node = builder.build().context("Failed to construct local node")?;

    node.start().await?;
    info!("Node started with services: {:?}", node.running_services());

    // Wait for shutdown signal
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
        _ = node.wait_stop() => {
            warn!("All services finished on their own");
        }
    }

    node.stop().await?;
    if let Err(e) = node.wait_stop_timeout(config.shutdown_timeout()).await {
        warn!("{}, exiting with {} services still running", e, node.pending_services());
    }

    info!("Daemon shutdown complete");
    Ok(())
}
