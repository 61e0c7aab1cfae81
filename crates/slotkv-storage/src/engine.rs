//! Partition storage engine
//!
//! A [`StorageEngine`] owns the three files of one partition. It is not
//! synchronized: the server gives each engine to a single worker thread.

use crate::config::EngineConfig;
use crate::data_log::DataLog;
use crate::index_log::IndexLog;
use crate::layout::PartitionLayout;
use crate::write_buffer::WriteBuffer;
use crate::{Result, StorageError};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Write statistics of one open partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Bytes written to the data log, including recovery replays
    pub bytes_written: u64,
    /// Number of data log writes
    pub batches: u64,
    /// Time spent in data log writes
    pub write_time: Duration,
    /// Bytes replayed from the write buffer when the partition was opened
    pub recovered_bytes: u64,
}

impl EngineStats {
    fn record(&mut self, bytes: usize, elapsed: Duration) {
        self.bytes_written += bytes as u64;
        self.batches += 1;
        self.write_time += elapsed;
    }
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {} writes ({:?}), {} bytes recovered",
            self.bytes_written, self.batches, self.write_time, self.recovered_bytes
        )
    }
}

enum EngineState {
    Uninitialized,
    Open(Box<Partition>),
    Closed,
}

/// Storage engine of one partition.
pub struct StorageEngine {
    config: Arc<EngineConfig>,
    state: EngineState,
}

impl StorageEngine {
    /// Create an engine that has not opened any files yet.
    pub const fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            state: EngineState::Uninitialized,
        }
    }

    /// Open the files of partition `instance`, recovering the data log if
    /// a previous run stopped before its last batch reached it.
    ///
    /// Calling `init` on an open engine does nothing. A closed engine is
    /// reopened.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a file cannot be
    /// opened, or the on-disk state cannot be reconciled.
    pub fn init(&mut self, instance: u8) -> Result<()> {
        if let EngineState::Open(partition) = &self.state {
            if partition.instance() != instance {
                warn!(
                    "Partition {} already open, ignoring init for {}",
                    partition.instance(),
                    instance
                );
            }
            return Ok(());
        }

        self.config.validate()?;
        let partition = Partition::open(&self.config, instance)?;
        self.state = EngineState::Open(Box::new(partition));
        Ok(())
    }

    /// Append `value` under `key`, allocating the next slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] if the engine is not open,
    /// [`StorageError::InvalidValueLength`] for a value of the wrong size,
    /// or an I/O error if a batch cannot be written.
    pub fn set(&mut self, key: u64, value: &[u8]) -> Result<()> {
        let value_len = self.config.value_len;
        let partition = self.partition_mut()?;
        if value.len() != value_len {
            return Err(StorageError::InvalidValueLength {
                expected: value_len,
                actual: value.len(),
            });
        }
        partition.set(key, value)
    }

    /// Read one block starting at byte `offset` of the data log.
    ///
    /// Staged values are written first so the block reflects every
    /// completed `set`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] if the engine is not open,
    /// or an error if the flush or read fails.
    pub fn read(&mut self, offset: u64) -> Result<Bytes> {
        let partition = self.partition_mut()?;
        partition.flush()?;
        let block = partition.data.read_block(offset)?;
        Ok(Bytes::copy_from_slice(block))
    }

    /// Write any staged values to the data log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] if the engine is not open,
    /// or an I/O error if the write fails.
    pub fn flush(&mut self) -> Result<()> {
        self.partition_mut()?.flush()
    }

    /// Flush, sync and release the partition files.
    ///
    /// Closing an engine that is not open does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or sync fails. The engine is
    /// closed regardless.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, EngineState::Closed) {
            EngineState::Open(mut partition) => partition.close(),
            EngineState::Uninitialized => {
                debug!("Close on uninitialized engine ignored");
                self.state = EngineState::Uninitialized;
                Ok(())
            }
            EngineState::Closed => {
                debug!("Close on closed engine ignored");
                Ok(())
            }
        }
    }

    /// Index log content after the header: the keys in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] if the engine is not open.
    pub fn index_log(&self) -> Result<Bytes> {
        let partition = self.partition()?;
        Ok(Bytes::copy_from_slice(partition.index.keys()))
    }

    /// Number of slots in the partition.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] if the engine is not open.
    pub fn slots(&self) -> Result<usize> {
        Ok(self.partition()?.index.len())
    }

    /// Write statistics since the partition was opened.
    pub fn stats(&self) -> Option<EngineStats> {
        self.partition().ok().map(|p| p.stats)
    }

    /// Partition id, if open.
    pub fn instance(&self) -> Option<u8> {
        self.partition().ok().map(Partition::instance)
    }

    /// Whether the engine is open.
    pub const fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Open(_))
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn partition(&self) -> Result<&Partition> {
        match &self.state {
            EngineState::Open(partition) => Ok(partition.as_ref()),
            _ => Err(StorageError::NotInitialized),
        }
    }

    fn partition_mut(&mut self) -> Result<&mut Partition> {
        match &mut self.state {
            EngineState::Open(partition) => Ok(partition.as_mut()),
            _ => Err(StorageError::NotInitialized),
        }
    }
}

impl fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Open(_) => "open",
            EngineState::Closed => "closed",
        };
        f.debug_struct("StorageEngine")
            .field("instance", &self.instance())
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

/// Open files of one partition.
struct Partition {
    layout: PartitionLayout,
    value_len: usize,
    data: DataLog,
    index: IndexLog,
    buffer: WriteBuffer,
    stats: EngineStats,
}

impl Partition {
    fn open(config: &EngineConfig, instance: u8) -> Result<Self> {
        std::fs::create_dir_all(&config.data_root)?;
        let layout = PartitionLayout::new(&config.data_root, instance);
        let fresh = !layout.index_path().exists();

        let buffer = WriteBuffer::open(
            &layout.temp_path(),
            config.value_len,
            config.write_buffer_records,
        )?;
        let index = IndexLog::open(&layout.index_path(), config.index_capacity)?;
        let data = DataLog::open(
            &layout.data_path(),
            config.use_direct_io(),
            config.read_block_size,
        )?;

        let mut partition = Self {
            layout,
            value_len: config.value_len,
            data,
            index,
            buffer,
            stats: EngineStats::default(),
        };
        partition.recover()?;

        if fresh {
            info!(
                "Created partition {} in {}",
                instance,
                config.data_root.display()
            );
        } else {
            info!(
                "Loaded partition {} with {} slots",
                instance,
                partition.index.len()
            );
        }
        Ok(partition)
    }

    const fn instance(&self) -> u8 {
        self.layout.instance()
    }

    /// Reconcile the data log with the index log.
    ///
    /// Every key in the index log has a slot, so the data log must be
    /// exactly `slots * value_len` long. A shortfall can only be the batch
    /// that was staged in the write buffer when the process stopped; it is
    /// replayed from the start of the buffer file. Extra bytes beyond the
    /// expected length belong to no key and are overwritten by later sets.
    fn recover(&mut self) -> Result<()> {
        let expected = (self.index.len() * self.value_len) as u64;
        let actual = self.data.write_pos();

        if actual < expected {
            let shortfall = usize::try_from(expected - actual).unwrap_or(usize::MAX);
            if actual % self.value_len as u64 != 0 {
                return Err(StorageError::Corruption(format!(
                    "data log of partition {} ends mid-record at {}",
                    self.instance(),
                    actual
                )));
            }
            let Some(staged) = self.buffer.head(shortfall) else {
                return Err(StorageError::Corruption(format!(
                    "data log of partition {} is {} bytes short, more than the {} byte write buffer",
                    self.instance(),
                    shortfall,
                    self.buffer.capacity()
                )));
            };

            warn!(
                "Partition {} data log is {} bytes short, replaying write buffer",
                self.instance(),
                shortfall
            );
            let start = Instant::now();
            self.data.append(staged)?;
            self.stats.record(shortfall, start.elapsed());
            self.stats.recovered_bytes = shortfall as u64;
        } else if actual > expected {
            warn!(
                "Partition {} data log has {} bytes past the last slot, ignoring them",
                self.instance(),
                actual - expected
            );
        }

        self.data.set_write_pos(expected);
        Ok(())
    }

    /// Stage `value` and record `key` in the next slot.
    ///
    /// On failure the value is withdrawn again, so the data log and the
    /// write buffer together hold exactly one value per indexed key.
    fn set(&mut self, key: u64, value: &[u8]) -> Result<()> {
        let full = self.buffer.push(value)?;
        let written = if full { self.write_batch() } else { Ok(()) };
        if let Err(e) = written {
            self.buffer.unstage_last();
            warn!(
                "Partition {} failed to write batch, {} values stay staged: {}",
                self.instance(),
                self.buffer.len(),
                e
            );
            return Err(e);
        }

        if let Err(e) = self.index.append(key) {
            if full {
                // The batch already reached the data log
                let pos = self.data.write_pos() - self.value_len as u64;
                self.data.set_write_pos(pos);
            } else {
                self.buffer.unstage_last();
            }
            return Err(e);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.write_batch()
    }

    fn write_batch(&mut self) -> Result<()> {
        let pending = self.buffer.pending();
        let start = Instant::now();
        self.data.append(pending)?;
        self.stats.record(pending.len(), start.elapsed());
        self.buffer.reset();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.buffer.sync()?;
        self.index.sync()?;
        self.data.sync()?;
        info!(
            "Closed partition {}: {} slots, {}",
            self.instance(),
            self.index.len(),
            self.stats
        );
        Ok(())
    }
}
