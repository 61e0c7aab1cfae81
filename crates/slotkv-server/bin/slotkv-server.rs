//! slotkv server binary entry point.
//!
//! This is a thin wrapper around the slotkv-server library that:
//! 1. Initializes logging
//! 2. Parses and validates configuration
//! 3. Starts the server

use anyhow::Result;
use slotkv_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("slotkv server starting...");

    let config = ServerConfig::from_args();

    tracing::info!(
        "Configuration loaded: bind={}, data_root={:?}, partitions={}",
        config.bind,
        config.data_root,
        config.partitions
    );

    config.validate()?;

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
