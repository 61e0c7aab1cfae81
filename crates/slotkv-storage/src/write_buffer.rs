//! Memory-mapped write-combine buffer
//!
//! Values are staged here until a full batch is pending, then written to
//! the data log in one call. The buffer is backed by the `{id}_temp` file,
//! so staged values survive a process crash and can be replayed on reopen.
//! Mapping the file also gives the page alignment direct I/O requires.

use crate::{Result, StorageError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Staging buffer of one partition.
pub struct WriteBuffer {
    _file: File,
    map: MmapMut,
    value_len: usize,
    pos: usize,
}

impl WriteBuffer {
    /// Open the buffer file at `path`, sized for `records` values of
    /// `value_len` bytes.
    ///
    /// Existing content is kept so it can be replayed by recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, resized or mapped.
    pub fn open(path: &Path, value_len: usize, records: usize) -> Result<Self> {
        let capacity = value_len * records;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < capacity as u64 {
            file.set_len(capacity as u64)?;
        }

        // The file is owned by the buffer and never shrinks while mapped.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(&file)? };

        Ok(Self {
            _file: file,
            map,
            value_len,
            pos: 0,
        })
    }

    /// Stage one value. Returns `true` once the buffer is full and must be
    /// drained before the next push.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidValueLength`] if `value` is not the
    /// configured length, or [`StorageError::WriteBufferFull`] if a full
    /// batch is still waiting to be written.
    pub fn push(&mut self, value: &[u8]) -> Result<bool> {
        if value.len() != self.value_len {
            return Err(StorageError::InvalidValueLength {
                expected: self.value_len,
                actual: value.len(),
            });
        }
        if self.is_full() {
            return Err(StorageError::WriteBufferFull {
                capacity: self.capacity(),
            });
        }
        self.map[self.pos..self.pos + self.value_len].copy_from_slice(value);
        self.pos += self.value_len;
        Ok(self.is_full())
    }

    /// Drop the most recently staged value.
    pub const fn unstage_last(&mut self) {
        self.pos = self.pos.saturating_sub(self.value_len);
    }

    /// Staged bytes not yet written to the data log.
    pub fn pending(&self) -> &[u8] {
        &self.map[..self.pos]
    }

    /// First `len` bytes of the mapped file, regardless of what is staged.
    ///
    /// Used by recovery to replay a batch that was staged before a crash.
    pub fn head(&self, len: usize) -> Option<&[u8]> {
        self.map.get(..len)
    }

    /// Forget staged values after they have been written.
    pub const fn reset(&mut self) {
        self.pos = 0;
    }

    /// Number of staged values.
    pub const fn len(&self) -> usize {
        self.pos / self.value_len
    }

    /// Whether nothing is staged.
    pub const fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Whether the buffer holds a full batch.
    pub fn is_full(&self) -> bool {
        self.pos == self.map.len()
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Flush staged content to the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("value_len", &self.value_len)
            .field("staged", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fills_after_batch() {
        let dir = TempDir::new().unwrap();
        let mut buffer = WriteBuffer::open(&dir.path().join("0_temp"), 4, 3).unwrap();
        assert!(buffer.is_empty());
        assert!(!buffer.push(b"aaaa").unwrap());
        assert!(!buffer.push(b"bbbb").unwrap());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pending(), b"aaaabbbb");
        assert!(buffer.push(b"cccc").unwrap());

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pending(), b"");
    }

    #[test]
    fn test_contents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0_temp");
        {
            let mut buffer = WriteBuffer::open(&path, 4, 3).unwrap();
            buffer.push(b"aaaa").unwrap();
            buffer.push(b"bbbb").unwrap();
        }

        let buffer = WriteBuffer::open(&path, 4, 3).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.head(8), Some(&b"aaaabbbb"[..]));
        assert_eq!(buffer.head(13), None);
    }

    #[test]
    fn test_push_on_full_buffer_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut buffer = WriteBuffer::open(&dir.path().join("0_temp"), 4, 2).unwrap();
        buffer.push(b"aaaa").unwrap();
        assert!(buffer.push(b"bbbb").unwrap());

        assert!(matches!(
            buffer.push(b"cccc"),
            Err(StorageError::WriteBufferFull { capacity: 8 })
        ));
        assert_eq!(buffer.pending(), b"aaaabbbb");

        // Dropping the last value makes room again
        buffer.unstage_last();
        assert_eq!(buffer.pending(), b"aaaa");
        assert!(buffer.push(b"dddd").unwrap());
        assert_eq!(buffer.pending(), b"aaaadddd");
    }

    #[test]
    fn test_push_rejects_wrong_length() {
        let dir = TempDir::new().unwrap();
        let mut buffer = WriteBuffer::open(&dir.path().join("0_temp"), 4, 2).unwrap();
        assert!(matches!(
            buffer.push(b"toolong"),
            Err(StorageError::InvalidValueLength {
                expected: 4,
                actual: 7
            })
        ));
        assert!(buffer.is_empty());

        buffer.unstage_last();
        assert!(buffer.is_empty());
    }
}
