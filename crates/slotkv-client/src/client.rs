//! The worker-facing key-value client.

use crate::block_cache::BlockCache;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::index_map::{EMPTY_KEY, IndexMap};
use crate::key::parse_key;
use bytes::Bytes;
use slotkv_protocol::MAX_INSTANCES;
use std::path::Path;
use tracing::{debug, info, warn};

/// Client bound to one server partition.
///
/// The client keeps the partition's key to slot index locally, loaded by
/// [`init`](Self::init) and extended by every [`set`](Self::set). Reads
/// resolve the slot locally and go through a block cache, so the server is
/// only contacted on a cache miss.
#[derive(Debug)]
pub struct KvClient {
    config: ClientConfig,
    instance: Option<u8>,
    connection: Option<Connection>,
    index: IndexMap,
    next_slot: u32,
    cache: BlockCache,
}

impl KvClient {
    /// Create an unconnected client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let cache = BlockCache::new(config.cache_blocks, config.read_block_size, config.value_len);
        let index = IndexMap::with_capacity(config.index_capacity);
        Ok(Self {
            config,
            instance: None,
            connection: None,
            index,
            next_slot: 0,
            cache,
        })
    }

    /// Client configuration.
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Partition the client is bound to, if initialized.
    pub const fn instance(&self) -> Option<u8> {
        self.instance
    }

    /// Whether [`init`](Self::init) has completed and the client is open.
    pub const fn is_initialized(&self) -> bool {
        self.instance.is_some()
    }

    /// Number of keys in the local index.
    pub const fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the local index holds no keys.
    pub const fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Slot the next SET will occupy.
    pub const fn next_slot(&self) -> u32 {
        self.next_slot
    }

    /// Block cache of this client.
    pub const fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Connect to partition `worker_id` and load its index.
    ///
    /// `directory` names the data location on the worker side; the server
    /// owns storage, so it is only logged. Calling `init` again for the
    /// same partition is a no-op while the connection is healthy, and
    /// reconnects otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker id is out of range, the client is
    /// bound to another partition, or the server cannot be reached.
    pub async fn init(&mut self, directory: impl AsRef<Path>, worker_id: u8) -> Result<()> {
        match self.instance {
            Some(instance) if instance == worker_id => {
                if self.connection.is_none() {
                    self.resync(instance).await?;
                }
                return Ok(());
            }
            Some(instance) => {
                return Err(ClientError::Config(format!(
                    "client is bound to partition {instance}, cannot init partition {worker_id}"
                )));
            }
            None => {}
        }
        if worker_id as usize >= MAX_INSTANCES {
            return Err(ClientError::Config(format!(
                "worker id {worker_id} is out of range 0..{MAX_INSTANCES}"
            )));
        }

        info!(
            "Initializing partition {} at {} (directory {})",
            worker_id,
            self.config.server,
            directory.as_ref().display()
        );

        self.resync(worker_id).await?;
        self.instance = Some(worker_id);

        info!(
            "Partition {} ready: {} slots, {} keys, {} probe conflicts",
            worker_id,
            self.next_slot,
            self.index.len(),
            self.index.conflicts()
        );
        Ok(())
    }

    /// Store `value` under `key`.
    ///
    /// Each set occupies a new slot, so setting a key again shadows its
    /// previous value. A failed set is not retried. The connection is
    /// dropped instead, and the next call reloads the index from the
    /// server, which tells whether the set was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not initialized, the key is
    /// reserved, the value has the wrong length, or the request fails.
    pub async fn set(&mut self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        let value = value.into();
        let numeric = parse_key(key);
        if numeric == EMPTY_KEY {
            return Err(ClientError::ReservedKey(numeric));
        }
        if value.len() != self.config.value_len {
            return Err(ClientError::InvalidValueLength {
                expected: self.config.value_len,
                actual: value.len(),
            });
        }

        let connection = self.connection().await?;
        if let Err(e) = connection.set(numeric, value).await {
            warn!("Set of key {} failed: {}, dropping connection", numeric, e);
            self.connection = None;
            return Err(e);
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.index.put(numeric, slot);
        self.cache.invalidate_slot(slot);
        debug!("Set key {} at slot {}", numeric, slot);
        Ok(())
    }

    /// Fetch the value stored under `key`, `None` if the key was never set.
    ///
    /// A transport failure is retried once on a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not initialized or the read fails
    /// after the retry.
    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>> {
        let numeric = parse_key(key);
        self.connection().await?;

        match self.read_key(numeric).await {
            Err(e) if e.is_transport() => {
                warn!("Read of key {} failed: {}, reconnecting", numeric, e);
                let instance = self.instance.ok_or(ClientError::NotInitialized)?;
                self.resync(instance).await?;
                info!("Reconnected to partition {}, retrying key {}", instance, numeric);
                self.read_key(numeric).await
            }
            result => result,
        }
    }

    /// Ask the server to write out buffered values.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not initialized or the request
    /// fails.
    pub async fn flush(&mut self) -> Result<()> {
        let connection = self.connection().await?;
        let instance = connection.instance();
        if let Err(e) = connection.flush().await {
            warn!("Flush of partition {} failed: {}, dropping connection", instance, e);
            self.connection = None;
            return Err(e);
        }
        debug!("Flushed partition {}", instance);
        Ok(())
    }

    /// Close the partition and drop the connection.
    ///
    /// Closing an unopened or closed client does nothing. The local index
    /// and cache are kept until the next [`init`](Self::init).
    ///
    /// # Errors
    ///
    /// Returns an error if the CLOSE request fails. The client is closed
    /// either way.
    pub async fn close(&mut self) -> Result<()> {
        let Some(instance) = self.instance.take() else {
            return Ok(());
        };
        let Some(mut connection) = self.connection.take() else {
            debug!("Partition {} has no open connection to close", instance);
            return Ok(());
        };
        info!("Closing partition {}", instance);
        connection.close().await?;
        let stats = self.cache.stats();
        info!(
            "Partition {} closed: {} cache hits, {} misses",
            instance, stats.hits, stats.misses
        );
        Ok(())
    }

    /// Open connection of an initialized client, reconnecting first if a
    /// failed request dropped it.
    async fn connection(&mut self) -> Result<&mut Connection> {
        let instance = self.instance.ok_or(ClientError::NotInitialized)?;
        if self.connection.is_none() {
            self.resync(instance).await?;
        }
        self.connection.as_mut().ok_or(ClientError::NotInitialized)
    }

    /// Open a fresh connection and rebuild the index from the partition's
    /// index log.
    ///
    /// The server's log is authoritative: after a lost acknowledgement it
    /// holds the slot the client never recorded. On failure the client
    /// stays without a connection and the next call tries again.
    async fn resync(&mut self, instance: u8) -> Result<()> {
        self.connection = None;
        let mut connection = self.connect(instance).await?;
        let response = connection.init().await?;

        self.index.clear();
        self.cache.clear();
        let mut slots = 0u32;
        for key in response.index_keys() {
            self.index.put(key, slots);
            slots += 1;
        }
        if self.instance.is_some() && slots != self.next_slot {
            warn!(
                "Partition {} has {} slots, local index expected {}",
                instance, slots, self.next_slot
            );
        }
        self.next_slot = slots;
        self.connection = Some(connection);
        Ok(())
    }

    async fn connect(&self, instance: u8) -> Result<Connection> {
        Connection::connect(
            &self.config.server,
            instance,
            self.config.value_len,
            self.config.timeout,
        )
        .await
    }

    /// Resolve `key` locally and read its slot, dropping the connection if
    /// the read fails.
    async fn read_key(&mut self, key: u64) -> Result<Option<Bytes>> {
        let Some(slot) = self.index.get(key) else {
            return Ok(None);
        };
        let connection = self.connection.as_mut().ok_or(ClientError::NotInitialized)?;
        match self.cache.read_slot(slot, connection).await {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.connection = None;
                Err(e)
            }
        }
    }
}
