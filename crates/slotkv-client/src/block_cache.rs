//! Fixed-capacity LRU cache of data log blocks.
//!
//! A block covers `block_size / value_len` consecutive slots and is fetched
//! with one READ. Entries are found by linear scan, which is cheap at the
//! small capacities the client uses. Recency is a logical clock bumped on
//! every access; on a miss the entry with the smallest access time is
//! replaced, the first one found winning ties.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Source of data log blocks.
#[async_trait]
pub trait BlockSource: Send {
    /// Fetch the block starting at byte `offset` of the data log. The block
    /// may be shorter than the configured size at the end of the log.
    async fn fetch_block(&mut self, offset: u64) -> Result<Bytes>;
}

/// Cache hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fetched a block
    pub misses: u64,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    block: Option<u64>,
    last_access: u64,
    data: Bytes,
}

/// LRU cache of blocks keyed by block index.
#[derive(Debug)]
pub struct BlockCache {
    entries: Vec<CacheEntry>,
    block_size: usize,
    value_len: usize,
    clock: u64,
    stats: CacheStats,
}

impl BlockCache {
    /// Create a cache of `capacity` blocks of `block_size` bytes holding
    /// values of `value_len` bytes.
    pub fn new(capacity: usize, block_size: usize, value_len: usize) -> Self {
        debug_assert!(capacity > 0 && value_len > 0 && block_size >= value_len);
        Self {
            entries: vec![CacheEntry::default(); capacity],
            block_size,
            value_len,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries holding a block.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.block.is_some()).count()
    }

    /// Whether no block is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `block_index` is cached.
    pub fn contains(&self, block_index: u64) -> bool {
        self.position(block_index).is_some()
    }

    /// Hit and miss counters.
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Block index holding `slot`.
    pub const fn block_of(&self, slot: u32) -> u64 {
        slot as u64 / (self.block_size / self.value_len) as u64
    }

    /// Return block `block_index`, fetching it from `source` on a miss.
    ///
    /// # Errors
    ///
    /// Returns the fetch error on a failed miss. The evicted entry is left
    /// empty so the next lookup fetches again.
    pub async fn lookup_or_fetch<S>(&mut self, block_index: u64, source: &mut S) -> Result<Bytes>
    where
        S: BlockSource + ?Sized,
    {
        let index = self.ensure(block_index, 0, source).await?;
        Ok(self.entries[index].data.clone())
    }

    /// Return the value stored in `slot`, fetching its block on a miss.
    ///
    /// A cached block that ends before the slot was read before the slot
    /// was written, so it is fetched again.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`ClientError::InvalidValueLength`] if
    /// the server returns a block that still does not cover the slot.
    pub async fn read_slot<S>(&mut self, slot: u32, source: &mut S) -> Result<Bytes>
    where
        S: BlockSource + ?Sized,
    {
        let block_index = self.block_of(slot);
        let start = (slot as usize % (self.block_size / self.value_len)) * self.value_len;
        let end = start + self.value_len;

        let index = self.ensure(block_index, end, source).await?;
        let data = &self.entries[index].data;
        if data.len() < end {
            return Err(ClientError::InvalidValueLength {
                expected: self.value_len,
                actual: data.len().saturating_sub(start),
            });
        }
        Ok(data.slice(start..end))
    }

    /// Drop the cached block holding `slot`.
    pub fn invalidate_slot(&mut self, slot: u32) {
        self.invalidate(self.block_of(slot));
    }

    /// Drop block `block_index` if cached.
    pub fn invalidate(&mut self, block_index: u64) {
        if let Some(index) = self.position(block_index) {
            self.entries[index] = CacheEntry::default();
        }
    }

    /// Drop every cached block.
    pub fn clear(&mut self) {
        self.entries.fill(CacheEntry::default());
    }

    fn position(&self, block_index: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.block == Some(block_index))
    }

    /// Index of the least recently used entry, the first one on ties.
    fn victim(&self) -> usize {
        let mut victim = 0;
        for (index, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.last_access < self.entries[victim].last_access {
                victim = index;
            }
        }
        victim
    }

    /// Make sure `block_index` is cached with at least `min_len` bytes and
    /// return its entry.
    async fn ensure<S>(&mut self, block_index: u64, min_len: usize, source: &mut S) -> Result<usize>
    where
        S: BlockSource + ?Sized,
    {
        self.clock += 1;

        let index = match self.position(block_index) {
            Some(index) if self.entries[index].data.len() >= min_len => {
                self.stats.hits += 1;
                self.entries[index].last_access = self.clock;
                return Ok(index);
            }
            Some(index) => {
                debug!("Block {} is shorter than {} bytes, refetching", block_index, min_len);
                index
            }
            None => self.victim(),
        };

        self.stats.misses += 1;
        let entry = &mut self.entries[index];
        if let Some(evicted) = entry.block.take() {
            debug!("Evicting block {}", evicted);
        }
        entry.data = Bytes::new();
        entry.last_access = 0;

        let offset = block_index * self.block_size as u64;
        let data = source.fetch_block(offset).await?;

        let entry = &mut self.entries[index];
        entry.block = Some(block_index);
        entry.data = data;
        entry.last_access = self.clock;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const VALUE_LEN: usize = 4;
    const BLOCK_SIZE: usize = 8;

    /// Serves blocks from an in-memory log and records every fetch.
    struct MockSource {
        log: Vec<u8>,
        fetches: Vec<u64>,
        fail: bool,
    }

    impl MockSource {
        fn with_slots(count: u8) -> Self {
            let log = (0..count).flat_map(|s| [s; VALUE_LEN]).collect();
            Self {
                log,
                fetches: Vec::new(),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl BlockSource for MockSource {
        async fn fetch_block(&mut self, offset: u64) -> Result<Bytes> {
            self.fetches.push(offset);
            if self.fail {
                return Err(ClientError::ConnectionClosed);
            }
            let start = (offset as usize).min(self.log.len());
            let end = (start + BLOCK_SIZE).min(self.log.len());
            Ok(Bytes::copy_from_slice(&self.log[start..end]))
        }
    }

    #[tokio::test]
    async fn test_read_slot() {
        let mut source = MockSource::with_slots(6);
        let mut cache = BlockCache::new(2, BLOCK_SIZE, VALUE_LEN);

        assert_eq!(&cache.read_slot(3, &mut source).await.unwrap()[..], &[3; 4]);
        assert_eq!(&cache.read_slot(2, &mut source).await.unwrap()[..], &[2; 4]);
        assert_eq!(source.fetches, vec![8]);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let mut source = MockSource::with_slots(8);
        let mut cache = BlockCache::new(3, BLOCK_SIZE, VALUE_LEN);

        for block in 0..3 {
            cache.lookup_or_fetch(block, &mut source).await.unwrap();
        }
        // Refresh block 0 so block 1 becomes least recent
        cache.lookup_or_fetch(0, &mut source).await.unwrap();
        cache.lookup_or_fetch(3, &mut source).await.unwrap();

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(source.fetches, vec![0, 8, 16, 24]);
    }

    #[tokio::test]
    async fn test_hits_never_evict() {
        let mut source = MockSource::with_slots(8);
        let mut cache = BlockCache::new(2, BLOCK_SIZE, VALUE_LEN);

        cache.lookup_or_fetch(0, &mut source).await.unwrap();
        cache.lookup_or_fetch(1, &mut source).await.unwrap();
        for _ in 0..10 {
            cache.lookup_or_fetch(1, &mut source).await.unwrap();
            cache.lookup_or_fetch(0, &mut source).await.unwrap();
        }

        assert_eq!(source.fetches.len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_plus_one_blocks() {
        let mut source = MockSource::with_slots(64);
        let capacity = 14;
        let mut cache = BlockCache::new(capacity, BLOCK_SIZE, VALUE_LEN);

        for block in 0..=capacity as u64 {
            cache.lookup_or_fetch(block, &mut source).await.unwrap();
        }
        assert_eq!(cache.len(), capacity);
        assert!(!cache.contains(0));
        assert!((1..=capacity as u64).all(|b| cache.contains(b)));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_entry_empty() {
        let mut source = MockSource::with_slots(8);
        let mut cache = BlockCache::new(1, BLOCK_SIZE, VALUE_LEN);
        cache.lookup_or_fetch(0, &mut source).await.unwrap();

        source.fail = true;
        assert!(cache.lookup_or_fetch(1, &mut source).await.is_err());
        assert!(cache.is_empty());

        source.fail = false;
        cache.lookup_or_fetch(1, &mut source).await.unwrap();
        assert!(cache.contains(1));
    }

    #[tokio::test]
    async fn test_short_block_is_refetched() {
        let mut source = MockSource::with_slots(1);
        let mut cache = BlockCache::new(2, BLOCK_SIZE, VALUE_LEN);
        cache.read_slot(0, &mut source).await.unwrap();

        // Slot 1 is appended after the block was cached
        source.log.extend_from_slice(&[9; VALUE_LEN]);
        assert_eq!(&cache.read_slot(1, &mut source).await.unwrap()[..], &[9; 4]);
        assert_eq!(source.fetches, vec![0, 0]);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_slot_past_end_of_log() {
        let mut source = MockSource::with_slots(1);
        let mut cache = BlockCache::new(2, BLOCK_SIZE, VALUE_LEN);

        assert!(matches!(
            cache.read_slot(1, &mut source).await,
            Err(ClientError::InvalidValueLength { actual: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let mut source = MockSource::with_slots(8);
        let mut cache = BlockCache::new(4, BLOCK_SIZE, VALUE_LEN);
        cache.read_slot(5, &mut source).await.unwrap();
        assert!(cache.contains(2));

        cache.invalidate_slot(4);
        assert!(!cache.contains(2));

        cache.read_slot(0, &mut source).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());

        let counts = source.fetches.iter().fold(HashMap::new(), |mut m, o| {
            *m.entry(*o).or_insert(0) += 1;
            m
        });
        assert_eq!(counts.len(), 2);
    }
}
