//! Server orchestration.
//!
//! Builds the partition registry from configuration, runs the TCP listener
//! and closes every partition on shutdown.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::partition::PartitionRegistry;
use slotkv_storage::clear_data_root;
use std::sync::Arc;

/// Server orchestration.
pub struct Server {
    /// Partition workers
    registry: Arc<PartitionRegistry>,
    /// Server configuration
    config: ServerConfig,
}

impl Server {
    /// Create new server with configuration.
    ///
    /// Clears the data root first when requested, then starts one worker
    /// per partition.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the configuration is invalid, the data root
    /// cannot be cleared, or a worker cannot be started.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        if config.clear_data {
            tracing::info!("Clearing partition files in {:?}", config.data_root);
            clear_data_root(&config.data_root)?;
        }

        let engine_config = Arc::new(config.engine_config());
        let registry = PartitionRegistry::start(engine_config, config.partitions)?;

        tracing::info!(
            "Server initialized with {} partitions, {} byte values, {} byte blocks",
            registry.len(),
            config.value_len,
            config.read_block_size
        );

        Ok(Self {
            registry: Arc::new(registry),
            config,
        })
    }

    /// Run the server.
    ///
    /// The server runs until interrupted or an error occurs. Every partition
    /// is closed before returning, flushing staged values.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the shutdown signal cannot be awaited.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting slotkv server");
        tracing::info!("TCP server binding to: {}", self.config.bind);
        tracing::info!(
            "Direct I/O {}",
            if self.config.engine_config().use_direct_io() {
                "requested"
            } else {
                "disabled"
            }
        );

        let tcp_registry = self.registry.clone();
        let bind = self.config.bind;
        let tcp_server = tokio::spawn(async move {
            if let Err(e) = crate::tcp::start_server(bind, tcp_registry).await {
                tracing::error!("TCP server failed: {e}");
            }
        });

        // Wait for shutdown signal
        let signal = tokio::signal::ctrl_c().await.map_err(|e| {
            ServerError::Shutdown(format!("Failed to listen for shutdown signal: {e}"))
        });

        tracing::info!("Shutdown signal received, stopping server");
        tcp_server.abort();
        self.registry.shutdown().await;

        signal
    }

    /// Partition registry shared with connection tasks.
    #[must_use]
    pub const fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }
}
