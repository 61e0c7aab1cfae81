//! Open-addressing map from numeric keys to slot numbers.
//!
//! Keys and slots live in two parallel arrays. A bucket is chosen by
//! `key & mask` and collisions probe linearly, wrapping at the end of the
//! table. `u64::MAX` marks an empty bucket, so it cannot be stored as a key.
//!
//! The table keeps its load at or below the load factor by doubling once
//! the number of entries exceeds `capacity * load_factor`. Removal shifts
//! later members of the probe chain back instead of leaving tombstones.

/// Marker for an empty bucket
pub const EMPTY_KEY: u64 = u64::MAX;

/// Smallest table size
pub const MIN_CAPACITY: usize = 16;

/// Highest load factor accepted
pub const MAX_LOAD_FACTOR: f32 = 0.75;

/// Lowest load factor accepted
pub const MIN_LOAD_FACTOR: f32 = 0.1;

/// Map from `u64` keys to `u32` slots.
#[derive(Debug, Clone)]
pub struct IndexMap {
    keys: Vec<u64>,
    slots: Vec<u32>,
    len: usize,
    mask: usize,
    limit: usize,
    load_factor: f32,
}

impl Default for IndexMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexMap {
    /// Create an empty map with the minimum capacity.
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Create an empty map whose table has at least `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_load_factor(capacity, MAX_LOAD_FACTOR)
    }

    /// Create an empty map with an explicit load factor, clamped to
    /// [`MIN_LOAD_FACTOR`]..=[`MAX_LOAD_FACTOR`].
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f32) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        let load_factor = load_factor.clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR);
        Self {
            keys: vec![EMPTY_KEY; capacity],
            slots: vec![0; capacity],
            len: 0,
            mask: capacity - 1,
            limit: limit_for(capacity, load_factor),
            load_factor,
        }
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the map has no entries.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Slot stored for `key`.
    pub fn get(&self, key: u64) -> Option<u32> {
        if key == EMPTY_KEY {
            return None;
        }
        self.find(key).map(|i| self.slots[i])
    }

    /// Whether `key` has an entry.
    pub fn contains_key(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Store `slot` under `key`, returning the slot it replaced.
    pub fn put(&mut self, key: u64, slot: u32) -> Option<u32> {
        self.insert(key, slot, true)
    }

    /// Store `slot` under `key` only if the key has no entry yet. Returns
    /// the existing slot otherwise.
    pub fn put_if_absent(&mut self, key: u64, slot: u32) -> Option<u32> {
        self.insert(key, slot, false)
    }

    /// Remove the entry for `key`, returning its slot.
    pub fn remove(&mut self, key: u64) -> Option<u32> {
        if key == EMPTY_KEY {
            return None;
        }
        let index = self.find(key)?;
        let removed = self.slots[index];
        self.shift_back(index);
        self.len -= 1;
        Some(removed)
    }

    /// Remove every entry, keeping the table size.
    pub fn clear(&mut self) {
        self.keys.fill(EMPTY_KEY);
        self.len = 0;
    }

    /// Number of entries not stored in their ideal bucket.
    pub fn conflicts(&self) -> usize {
        self.keys
            .iter()
            .enumerate()
            .filter(|&(i, &key)| key != EMPTY_KEY && self.ideal(key) != i)
            .count()
    }

    /// Iterate `(key, slot)` pairs in bucket order.
    ///
    /// Each call starts a new scan from the first bucket.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            map: self,
            bucket: 0,
            remaining: self.len,
        }
    }

    const fn ideal(&self, key: u64) -> usize {
        key as usize & self.mask
    }

    const fn next(&self, index: usize) -> usize {
        (index + 1) & self.mask
    }

    fn find(&self, key: u64) -> Option<usize> {
        let mut index = self.ideal(key);
        loop {
            match self.keys[index] {
                k if k == key => return Some(index),
                EMPTY_KEY => return None,
                _ => index = self.next(index),
            }
        }
    }

    fn insert(&mut self, key: u64, slot: u32, replace: bool) -> Option<u32> {
        debug_assert_ne!(key, EMPTY_KEY, "u64::MAX is reserved for empty buckets");

        let mut index = self.ideal(key);
        loop {
            let current = self.keys[index];
            if current == key {
                let previous = self.slots[index];
                if replace {
                    self.slots[index] = slot;
                }
                return Some(previous);
            }
            if current == EMPTY_KEY {
                break;
            }
            index = self.next(index);
        }

        self.keys[index] = key;
        self.slots[index] = slot;
        self.len += 1;
        if self.len > self.limit {
            self.grow();
        }
        None
    }

    /// Close the gap at `hole` by moving later chain members whose ideal
    /// bucket does not lie cyclically in `(hole, current]`.
    fn shift_back(&mut self, mut hole: usize) {
        let mut current = hole;
        loop {
            current = self.next(current);
            let key = self.keys[current];
            if key == EMPTY_KEY {
                break;
            }
            let ideal = self.ideal(key);
            let stays = if hole <= current {
                hole < ideal && ideal <= current
            } else {
                hole < ideal || ideal <= current
            };
            if !stays {
                self.keys[hole] = key;
                self.slots[hole] = self.slots[current];
                hole = current;
            }
        }
        self.keys[hole] = EMPTY_KEY;
    }

    fn grow(&mut self) {
        let capacity = (self.capacity() + 1).next_power_of_two();
        let keys = std::mem::replace(&mut self.keys, vec![EMPTY_KEY; capacity]);
        let slots = std::mem::replace(&mut self.slots, vec![0; capacity]);
        self.mask = capacity - 1;
        self.limit = limit_for(capacity, self.load_factor);

        for (key, slot) in keys.into_iter().zip(slots) {
            if key == EMPTY_KEY {
                continue;
            }
            let mut index = self.ideal(key);
            while self.keys[index] != EMPTY_KEY {
                index = self.next(index);
            }
            self.keys[index] = key;
            self.slots[index] = slot;
        }
    }
}

/// Entries allowed before the table doubles. Never zero, so a tiny table
/// still holds one entry before growing.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn limit_for(capacity: usize, load_factor: f32) -> usize {
    ((capacity as f32 * load_factor) as usize).max(1)
}

/// Iterator over `(key, slot)` pairs in bucket order.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    map: &'a IndexMap,
    bucket: usize,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = (u64, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while self.bucket < self.map.keys.len() {
            let index = self.bucket;
            self.bucket += 1;
            let key = self.map.keys[index];
            if key != EMPTY_KEY {
                self.remaining -= 1;
                return Some((key, self.map.slots[index]));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a IndexMap {
    type Item = (u64, u32);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
