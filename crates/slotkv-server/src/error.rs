//! Error types for the slotkv server.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use slotkv_protocol::ProtocolError;
use slotkv_storage::StorageError;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is out of range or inconsistent with another
    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        /// Setting that failed validation
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Missing required configuration value
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the TCP listener
    #[error("Failed to bind TCP server to {addr}: {source}")]
    TcpBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to start a partition worker thread
    #[error("Failed to start worker for partition {instance}: {source}")]
    WorkerSpawnFailed {
        /// Partition the worker would own
        instance: u8,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The worker owning a partition has stopped
    #[error("Partition {0} is not running")]
    PartitionStopped(u8),

    /// Storage error raised by a partition engine
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Framing error on a client connection
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error outside of framing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    Shutdown(String),
}
