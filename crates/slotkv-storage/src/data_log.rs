//! Append-only data log
//!
//! Values are written in whole batches at the logical write position and
//! read back in fixed-size blocks. When direct I/O is requested the file is
//! opened with `O_DIRECT` on Linux; filesystems that refuse the flag fall
//! back to buffered I/O.

use crate::{DIRECT_IO_ALIGN, Result, StorageError};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Data log of one partition.
pub struct DataLog {
    file: File,
    path: PathBuf,
    direct: bool,
    /// Logical end of the log. May be below the file length after recovery.
    write_pos: u64,
    /// Page-aligned block buffer, reused by every read
    read_buf: MmapMut,
}

impl DataLog {
    /// Open or create the data log at `path`.
    ///
    /// The write position starts at the current file length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the read buffer
    /// cannot be allocated.
    pub fn open(path: &Path, direct: bool, read_block_size: usize) -> Result<Self> {
        let (file, direct) = open_file(path, direct)?;
        let write_pos = file.metadata()?.len();
        let read_buf = MmapMut::map_anon(read_block_size)?;

        debug!(
            "Opened data log {} (direct: {}, length: {})",
            path.display(),
            direct,
            write_pos
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            direct,
            write_pos,
            read_buf,
        })
    }

    /// Logical end of the log in bytes.
    pub const fn write_pos(&self) -> u64 {
        self.write_pos
    }

    /// Move the logical end of the log. Later appends overwrite anything
    /// beyond it.
    pub const fn set_write_pos(&mut self, pos: u64) {
        self.write_pos = pos;
    }

    /// Whether the file is open for direct I/O.
    pub const fn is_direct(&self) -> bool {
        self.direct
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `buf` at the write position and advance it.
    ///
    /// With direct I/O `buf` must be page aligned and a multiple of
    /// [`DIRECT_IO_ALIGN`] long.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The write position is left
    /// unchanged in that case.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(self.write_pos))?;
        file.write_all(buf)?;
        self.write_pos += buf.len() as u64;
        Ok(())
    }

    /// Read one block starting at byte `offset`.
    ///
    /// The block is shorter than the configured size when it reaches the
    /// end of the log, and empty when `offset` is at or past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or, with direct I/O, if `offset`
    /// is not aligned.
    pub fn read_block(&mut self, offset: u64) -> Result<&[u8]> {
        if offset >= self.write_pos {
            return Ok(&[]);
        }
        if self.direct && offset % DIRECT_IO_ALIGN as u64 != 0 {
            return Err(StorageError::UnalignedRead {
                offset,
                align: DIRECT_IO_ALIGN,
            });
        }

        let available = usize::try_from(self.write_pos - offset).unwrap_or(usize::MAX);
        let want = self.read_buf.len().min(available);

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;

        // Direct reads transfer whole pages, so read into the full aligned
        // buffer and trim to the logical end afterwards.
        let mut filled = 0;
        while filled < want {
            match file.read(&mut self.read_buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(&self.read_buf[..filled.min(want)])
    }

    /// Flush file data to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl std::fmt::Debug for DataLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLog")
            .field("path", &self.path)
            .field("direct", &self.direct)
            .field("write_pos", &self.write_pos)
            .field("block_size", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}

fn buffered_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    options
}

/// Open the data file, returning whether direct I/O is in effect.
#[cfg(target_os = "linux")]
fn open_file(path: &Path, direct: bool) -> Result<(File, bool)> {
    use std::os::unix::fs::OpenOptionsExt;

    if !direct {
        return Ok((buffered_options().open(path)?, false));
    }

    let mut options = buffered_options();
    options.custom_flags(libc::O_DIRECT);
    match options.open(path) {
        Ok(file) => Ok((file, true)),
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            warn!(
                "Filesystem does not support direct I/O for {}, using buffered I/O",
                path.display()
            );
            Ok((buffered_options().open(path)?, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Open the data file, returning whether direct I/O is in effect.
#[cfg(not(target_os = "linux"))]
fn open_file(path: &Path, direct: bool) -> Result<(File, bool)> {
    if direct {
        debug!("Direct I/O is only available on Linux, using buffered I/O");
    }
    Ok((buffered_options().open(path)?, false))
}
