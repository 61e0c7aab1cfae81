//! Server-side partition storage for slotkv.
//!
//! Each partition owns three files in the data root:
//!
//! - `{id}_data`: append-only log of fixed-length values. Slot `i` lives at
//!   byte offset `i * value_len`.
//! - `{id}_index`: memory-mapped log of 8-byte keys in slot order. Bytes
//!   `0..8` hold the durable cursor, the byte position of the next key
//!   record.
//! - `{id}_temp`: memory-mapped write-combine buffer that batches several
//!   values into one data log write.
//!
//! The index log is the durability oracle. When a partition is reopened the
//! data log is reconciled against it, replaying the tail from the
//! write-combine buffer if a batched write never reached the data log.
//!
//! # Example
//!
//! ```no_run
//! use slotkv_storage::{EngineConfig, StorageEngine};
//! use std::sync::Arc;
//!
//! # fn example() -> slotkv_storage::Result<()> {
//! let config = Arc::new(EngineConfig::new("/var/lib/slotkv"));
//! let mut engine = StorageEngine::new(config);
//! engine.init(0)?;
//! engine.set(42, &[0x41; 4096])?;
//! let block = engine.read(0)?;
//! assert_eq!(&block[..4096], &[0x41; 4096][..]);
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use thiserror::Error;

pub mod config;
pub mod data_log;
pub mod engine;
pub mod index_log;
pub mod layout;
pub mod write_buffer;

pub use config::EngineConfig;
pub use engine::{EngineStats, StorageEngine};
pub use layout::{PartitionLayout, clear_data_root};

/// Alignment required for direct I/O buffers, offsets and lengths.
pub const DIRECT_IO_ALIGN: usize = 4096;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Storage errors are never retried: a failed write may leave the data log
/// behind the index log, which only a reopen can repair.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine has not been initialized or was closed.
    #[error("Partition not initialized")]
    NotInitialized,

    /// A value does not match the configured value length.
    #[error("Value length {actual} does not match configured length {expected}")]
    InvalidValueLength {
        /// Configured fixed value length.
        expected: usize,
        /// Length of the value supplied.
        actual: usize,
    },

    /// A value was staged while a full batch was still waiting to be
    /// written.
    #[error("Write buffer of {capacity} bytes is full")]
    WriteBufferFull {
        /// Buffer size in bytes.
        capacity: usize,
    },

    /// On-disk state is inconsistent and cannot be repaired.
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// A direct read was requested at an offset the device cannot serve.
    #[error("Read offset {offset} is not aligned to {align} bytes")]
    UnalignedRead {
        /// Requested offset.
        offset: u64,
        /// Required alignment.
        align: usize,
    },

    /// Engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StorageError::NotInitialized.to_string(),
            "Partition not initialized"
        );
        let err = StorageError::UnalignedRead {
            offset: 10,
            align: DIRECT_IO_ALIGN,
        };
        assert_eq!(err.to_string(), "Read offset 10 is not aligned to 4096 bytes");
        assert_eq!(
            StorageError::WriteBufferFull { capacity: 96 }.to_string(),
            "Write buffer of 96 bytes is full"
        );
    }
}
