//! Memory-mapped key log
//!
//! Layout: an 8-byte little-endian cursor at offset 0 followed by 8-byte
//! key records in slot order. The cursor is the byte position of the next
//! record, so a log holding `n` keys has cursor `8 + 8 * n`. The file is
//! pre-sized and doubled when full.

use crate::{Result, StorageError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size of the cursor header and of one key record
const RECORD_LEN: usize = 8;

/// Key log of one partition.
pub struct IndexLog {
    file: File,
    path: PathBuf,
    map: MmapMut,
    cursor: usize,
}

impl IndexLog {
    /// Open the index log at `path`, creating it with room for `capacity`
    /// records if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or
    /// [`StorageError::Corruption`] if the stored cursor is inconsistent
    /// with the file.
    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(((capacity + 1) * RECORD_LEN) as u64)?;
        } else if len < RECORD_LEN as u64 {
            return Err(StorageError::Corruption(format!(
                "index log {} is {} bytes, shorter than its header",
                path.display(),
                len
            )));
        }

        let map = map_file(&file)?;
        let stored = read_u64(&map, 0);
        // A cursor of zero means the header was never written.
        let cursor = if stored == 0 {
            RECORD_LEN
        } else {
            usize::try_from(stored).unwrap_or(usize::MAX)
        };

        if cursor > map.len() || cursor % RECORD_LEN != 0 {
            return Err(StorageError::Corruption(format!(
                "index log {} cursor {} is invalid for a {} byte file",
                path.display(),
                stored,
                map.len()
            )));
        }

        let mut log = Self {
            file,
            path: path.to_path_buf(),
            map,
            cursor,
        };
        log.store_cursor();

        debug!(
            "Opened index log {} with {} records",
            path.display(),
            log.len()
        );
        Ok(log)
    }

    /// Number of keys in the log.
    pub const fn len(&self) -> usize {
        (self.cursor - RECORD_LEN) / RECORD_LEN
    }

    /// Whether the log holds no keys.
    pub const fn is_empty(&self) -> bool {
        self.cursor == RECORD_LEN
    }

    /// Number of records that fit before the file must grow.
    pub fn capacity(&self) -> usize {
        self.map.len() / RECORD_LEN - 1
    }

    /// Append `key` and advance the durable cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has to grow and cannot be resized or
    /// remapped.
    pub fn append(&mut self, key: u64) -> Result<()> {
        if self.cursor + RECORD_LEN > self.map.len() {
            self.grow()?;
        }
        self.map[self.cursor..self.cursor + RECORD_LEN].copy_from_slice(&key.to_le_bytes());
        self.cursor += RECORD_LEN;
        self.store_cursor();
        Ok(())
    }

    /// Key stored in `slot`.
    pub fn get(&self, slot: usize) -> Option<u64> {
        let offset = RECORD_LEN + slot.checked_mul(RECORD_LEN)?;
        (offset < self.cursor).then(|| read_u64(&self.map, offset))
    }

    /// Raw key records in slot order, without the header.
    pub fn keys(&self) -> &[u8] {
        &self.map[RECORD_LEN..self.cursor]
    }

    /// Flush the mapping to the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    fn store_cursor(&mut self) {
        self.map[..RECORD_LEN].copy_from_slice(&(self.cursor as u64).to_le_bytes());
    }

    fn grow(&mut self) -> Result<()> {
        let new_len = self.map.len() * 2;
        debug!(
            "Growing index log {} from {} to {} bytes",
            self.path.display(),
            self.map.len(),
            new_len
        );

        self.map.flush()?;
        self.file.set_len(new_len as u64)?;
        self.map = map_file(&self.file)?;
        Ok(())
    }
}

impl std::fmt::Debug for IndexLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLog")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

fn map_file(file: &File) -> Result<MmapMut> {
    // The file is owned by the log and only ever grows while mapped.
    #[allow(unsafe_code)]
    let map = unsafe { MmapOptions::new().map_mut(file)? };
    Ok(map)
}

fn read_u64(map: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; RECORD_LEN];
    raw.copy_from_slice(&map[offset..offset + RECORD_LEN]);
    u64::from_le_bytes(raw)
}
