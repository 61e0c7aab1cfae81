//! Engine configuration

use crate::{DIRECT_IO_ALIGN, Result, StorageError};
use std::path::{Path, PathBuf};

pub use slotkv_protocol::{DEFAULT_READ_BLOCK_SIZE, DEFAULT_VALUE_LEN};

/// Default number of values batched before a data log write
pub const DEFAULT_WRITE_BUFFER_RECORDS: usize = 256;

/// Default initial index log capacity in records
pub const DEFAULT_INDEX_CAPACITY: usize = 66 * 1024;

/// Configuration shared by every partition of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding the partition files
    pub data_root: PathBuf,
    /// Fixed length of every value
    pub value_len: usize,
    /// Bytes returned by one block read
    pub read_block_size: usize,
    /// Values batched in the write-combine buffer
    pub write_buffer_records: usize,
    /// Initial index log capacity in records, grown on demand
    pub index_capacity: usize,
    /// Request unbuffered I/O for the data log
    pub direct_io: bool,
}

impl EngineConfig {
    /// Create a configuration with default sizes rooted at `data_root`.
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
            value_len: DEFAULT_VALUE_LEN,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            write_buffer_records: DEFAULT_WRITE_BUFFER_RECORDS,
            index_capacity: DEFAULT_INDEX_CAPACITY,
            direct_io: true,
        }
    }

    /// Set the fixed value length.
    #[must_use]
    pub const fn with_value_len(mut self, value_len: usize) -> Self {
        self.value_len = value_len;
        self
    }

    /// Set the block read size.
    #[must_use]
    pub const fn with_read_block_size(mut self, read_block_size: usize) -> Self {
        self.read_block_size = read_block_size;
        self
    }

    /// Set the write-combine buffer size in records.
    #[must_use]
    pub const fn with_write_buffer_records(mut self, records: usize) -> Self {
        self.write_buffer_records = records;
        self
    }

    /// Set the initial index log capacity in records.
    #[must_use]
    pub const fn with_index_capacity(mut self, records: usize) -> Self {
        self.index_capacity = records;
        self
    }

    /// Enable or disable direct I/O for the data log.
    #[must_use]
    pub const fn with_direct_io(mut self, direct_io: bool) -> Self {
        self.direct_io = direct_io;
        self
    }

    /// Size of the write-combine buffer in bytes.
    pub const fn write_buffer_len(&self) -> usize {
        self.value_len * self.write_buffer_records
    }

    /// Whether the data log should be opened for direct I/O.
    ///
    /// Direct I/O is only used when every write and read stays aligned,
    /// which holds when both the value length and the block size are
    /// multiples of the device alignment.
    pub const fn use_direct_io(&self) -> bool {
        self.direct_io
            && self.value_len % DIRECT_IO_ALIGN == 0
            && self.read_block_size % DIRECT_IO_ALIGN == 0
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a size is zero or the block size is smaller than
    /// one value.
    pub fn validate(&self) -> Result<()> {
        if self.value_len == 0 {
            return Err(StorageError::Config("value length must be non-zero".into()));
        }
        if self.write_buffer_records == 0 {
            return Err(StorageError::Config(
                "write buffer must hold at least one record".into(),
            ));
        }
        if self.index_capacity == 0 {
            return Err(StorageError::Config(
                "index capacity must be non-zero".into(),
            ));
        }
        if self.read_block_size < self.value_len {
            return Err(StorageError::Config(format!(
                "read block size {} is smaller than value length {}",
                self.read_block_size, self.value_len
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root() {
        assert_eq!(EngineConfig::default().data_root, PathBuf::from("data"));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("/tmp/slotkv");
        assert_eq!(config.value_len, slotkv_protocol::DEFAULT_VALUE_LEN);
        assert_eq!(config.value_len, 4096);
        assert_eq!(config.read_block_size, 1 << 20);
        assert_eq!(config.write_buffer_len(), 256 * 4096);
        assert!(config.use_direct_io());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unaligned_sizes_disable_direct_io() {
        let config = EngineConfig::new("/tmp/slotkv")
            .with_value_len(100)
            .with_read_block_size(1000);
        assert!(config.direct_io);
        assert!(!config.use_direct_io());
    }

    #[test]
    fn test_validate_rejects_small_block() {
        let config = EngineConfig::new("/tmp/slotkv")
            .with_value_len(4096)
            .with_read_block_size(1024);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));

        let config = EngineConfig::new("/tmp/slotkv").with_write_buffer_records(0);
        assert!(config.validate().is_err());
    }
}
