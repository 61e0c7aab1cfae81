//! Client configuration

use crate::error::{ClientError, Result};
use slotkv_protocol::{DEFAULT_PORT, DEFAULT_READ_BLOCK_SIZE, DEFAULT_VALUE_LEN};
use std::time::Duration;
use url::Url;

/// Default number of cached blocks per client
pub const DEFAULT_CACHE_BLOCKS: usize = 14;

/// Default initial capacity of the local key index
pub const DEFAULT_INDEX_CAPACITY: usize = 66 * 1024;

/// Default time to wait for a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address as `host:port`
    pub server: String,
    /// Fixed value length, must match the server
    pub value_len: usize,
    /// Block size served by READ, must match the server
    pub read_block_size: usize,
    /// Number of blocks kept in the cache
    pub cache_blocks: usize,
    /// Initial capacity of the local key index
    pub index_capacity: usize,
    /// Connect and response timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            value_len: DEFAULT_VALUE_LEN,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            index_capacity: DEFAULT_INDEX_CAPACITY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Configuration with default sizes for the server at `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// - `SLOTKV_RPC_URI`: server URI such as `tcp://10.0.0.5:9571`. Only
    ///   the host and port are used; the port defaults to 9571.
    /// - `SLOTKV_TIMEOUT_MS`: response timeout in milliseconds
    /// - `SLOTKV_CACHE_BLOCKS`: number of cached blocks
    ///
    /// Unset or unparsable numbers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `SLOTKV_RPC_URI` is set but is not a URI with a
    /// host.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from a variable lookup, as [`Self::from_env`]
    /// does with the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC URI is set but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(uri) = lookup("SLOTKV_RPC_URI") {
            config.server = server_from_uri(&uri)?;
        }
        if let Some(ms) = lookup("SLOTKV_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(blocks) = lookup("SLOTKV_CACHE_BLOCKS").and_then(|s| s.parse().ok()) {
            config.cache_blocks = blocks;
        }

        Ok(config)
    }

    /// Number of values in one block.
    pub const fn slots_per_block(&self) -> usize {
        self.read_block_size / self.value_len
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a size is zero or the block size is not a whole
    /// number of values.
    pub fn validate(&self) -> Result<()> {
        if self.value_len == 0 || self.read_block_size % self.value_len != 0 {
            return Err(ClientError::Config(format!(
                "read block size {} is not a multiple of value length {}",
                self.read_block_size, self.value_len
            )));
        }
        if self.read_block_size == 0 {
            return Err(ClientError::Config("read block size must be non-zero".into()));
        }
        if self.cache_blocks == 0 {
            return Err(ClientError::Config("cache must hold at least one block".into()));
        }
        Ok(())
    }
}

fn server_from_uri(uri: &str) -> Result<String> {
    let url = Url::parse(uri).map_err(|e| ClientError::Config(format!("invalid RPC URI {uri}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::Config(format!("RPC URI {uri} has no host")))?;
    let port = url.port().unwrap_or(DEFAULT_PORT);
    Ok(format!("{host}:{port}"))
}
