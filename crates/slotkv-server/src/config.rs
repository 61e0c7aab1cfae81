//! Server configuration management.
//!
//! Configuration is loaded from CLI arguments with environment variable
//! fallbacks and validated before any partition is opened.
//!
//! # Configuration Sources
//!
//! - CLI arguments (`--bind`, `--data-root`, etc.)
//! - Environment variables (`SLOTKV_BIND`, `SLOTKV_DATA_ROOT`, etc.)
//! - Default values
//!
//! # Example
//!
//! ```no_run
//! use slotkv_server::ServerConfig;
//!
//! let config = ServerConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! println!("Serving {} partitions on {}", config.partitions, config.bind);
//! ```

use crate::error::ConfigError;
use clap::{ArgAction, Parser};
use slotkv_protocol::{DEFAULT_READ_BLOCK_SIZE, DEFAULT_VALUE_LEN, MAX_INSTANCES};
use slotkv_storage::EngineConfig;
use slotkv_storage::config::{DEFAULT_INDEX_CAPACITY, DEFAULT_WRITE_BUFFER_RECORDS};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "slotkv-server",
    about = "Partitioned fixed-value key-value storage server",
    version
)]
pub struct ServerConfig {
    /// TCP bind address
    #[arg(long, env = "SLOTKV_BIND", default_value = "0.0.0.0:9571")]
    pub bind: SocketAddr,

    /// Directory holding the partition files
    #[arg(long, env = "SLOTKV_DATA_ROOT", default_value = "./data")]
    pub data_root: PathBuf,

    /// Number of partitions served (at most 16)
    #[arg(long, env = "SLOTKV_PARTITIONS", default_value_t = MAX_INSTANCES)]
    pub partitions: usize,

    /// Fixed value length in bytes
    #[arg(long, env = "SLOTKV_VALUE_LEN", default_value_t = DEFAULT_VALUE_LEN)]
    pub value_len: usize,

    /// Bytes returned by one READ
    #[arg(long, env = "SLOTKV_READ_BLOCK_SIZE", default_value_t = DEFAULT_READ_BLOCK_SIZE)]
    pub read_block_size: usize,

    /// Values batched before a data log write
    #[arg(
        long,
        env = "SLOTKV_WRITE_BUFFER_RECORDS",
        default_value_t = DEFAULT_WRITE_BUFFER_RECORDS
    )]
    pub write_buffer_records: usize,

    /// Initial index log capacity per partition, in records
    #[arg(long, env = "SLOTKV_INDEX_CAPACITY", default_value_t = DEFAULT_INDEX_CAPACITY)]
    pub index_capacity: usize,

    /// Use direct I/O for data logs where supported
    #[arg(
        long,
        env = "SLOTKV_DIRECT_IO",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub direct_io: bool,

    /// Remove all partition files before starting
    #[arg(long, env = "SLOTKV_CLEAR_DATA")]
    pub clear_data: bool,
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Configuration with default sizes, serving `data_root`.
    pub fn new(bind: SocketAddr, data_root: impl Into<PathBuf>) -> Self {
        Self {
            bind,
            data_root: data_root.into(),
            partitions: MAX_INSTANCES,
            value_len: DEFAULT_VALUE_LEN,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            write_buffer_records: DEFAULT_WRITE_BUFFER_RECORDS,
            index_capacity: DEFAULT_INDEX_CAPACITY,
            direct_io: true,
            clear_data: false,
        }
    }

    /// Engine configuration shared by every partition.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.data_root)
            .with_value_len(self.value_len)
            .with_read_block_size(self.read_block_size)
            .with_write_buffer_records(self.write_buffer_records)
            .with_index_capacity(self.index_capacity)
            .with_direct_io(self.direct_io)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The partition count is zero or above 16
    /// - The value length, buffer size or index capacity is zero
    /// - The read block size is not a whole number of values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 || self.partitions > MAX_INSTANCES {
            return Err(ConfigError::InvalidValue {
                field: "partitions",
                reason: format!(
                    "{} is not between 1 and {MAX_INSTANCES}",
                    self.partitions
                ),
            });
        }

        if self.value_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "value length",
                reason: "must be non-zero".to_string(),
            });
        }

        if self.read_block_size == 0 || self.read_block_size % self.value_len != 0 {
            return Err(ConfigError::InvalidValue {
                field: "read block size",
                reason: format!(
                    "{} is not a non-zero multiple of the value length {}",
                    self.read_block_size, self.value_len
                ),
            });
        }

        if self.write_buffer_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write buffer records",
                reason: "must be non-zero".to_string(),
            });
        }

        if self.index_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "index capacity",
                reason: "must be non-zero".to_string(),
            });
        }

        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("data root".to_string()));
        }

        Ok(())
    }
}
