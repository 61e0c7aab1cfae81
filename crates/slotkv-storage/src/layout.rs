//! Partition file naming and cleanup

use crate::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DATA_SUFFIX: &str = "_data";
const INDEX_SUFFIX: &str = "_index";
const TEMP_SUFFIX: &str = "_temp";

/// Paths of the three files backing one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    root: PathBuf,
    instance: u8,
}

impl PartitionLayout {
    /// Layout of partition `instance` under `root`.
    pub fn new(root: impl AsRef<Path>, instance: u8) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            instance,
        }
    }

    /// Partition id.
    pub const fn instance(&self) -> u8 {
        self.instance
    }

    /// `{id}_data`
    pub fn data_path(&self) -> PathBuf {
        self.path(DATA_SUFFIX)
    }

    /// `{id}_index`
    pub fn index_path(&self) -> PathBuf {
        self.path(INDEX_SUFFIX)
    }

    /// `{id}_temp`
    pub fn temp_path(&self) -> PathBuf {
        self.path(TEMP_SUFFIX)
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{suffix}", self.instance))
    }
}

/// Whether `name` is a partition file produced by [`PartitionLayout`].
fn is_partition_file(name: &str) -> bool {
    [DATA_SUFFIX, INDEX_SUFFIX, TEMP_SUFFIX].iter().any(|suffix| {
        name.strip_suffix(suffix)
            .is_some_and(|id| !id.is_empty() && id.parse::<u8>().is_ok())
    })
}

/// Remove every partition file under `root`, leaving other files alone.
///
/// Returns the number of files removed. A missing directory is not an error.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a file cannot be
/// removed.
pub fn clear_data_root(root: &Path) -> Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if entry.file_type()?.is_file() && is_partition_file(name) {
            debug!("Removing {}", entry.path().display());
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    info!("Cleared {} partition files from {}", removed, root.display());
    Ok(removed)
}
