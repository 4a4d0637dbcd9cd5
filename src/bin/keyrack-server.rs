//! KEYRACK Server Binary
//!
//! Loads the service configuration, builds the storage registry and runs
//! the gateway.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use keyrack::{Registry, Server, ServiceConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// KEYRACK Server - Multi-Backend Key-Value Storage Gateway
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "keyrack.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("keyrack=info".parse()?))
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config file {}", args.config.display()))?;
    let mut config = ServiceConfig::from_toml(&raw)
        .with_context(|| format!("parsing config file {}", args.config.display()))?;

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let registry = Registry::open(&config.storages)?;
    let names: Vec<String> = registry.names().map(String::from).collect();
    info!(
        "Starting keyrack gateway on {}:{} with storages {:?}",
        config.server.bind, config.server.port, names
    );

    let server = Server::new(config.server.clone(), registry);
    server.run().await?;

    Ok(())
}
