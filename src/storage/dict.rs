//! Incrementally Rehashing Hash Table
//!
//! `Dict` is the primary key→value structure of the store. It is a
//! separate-chaining hash table whose buckets are plain vectors, so there
//! are no raw pointers and no manual frees: a slot dies when it is removed
//! from its bucket.
//!
//! ## Incremental Rehashing
//!
//! Growing a table with millions of keys in one go would stall the single
//! worker thread. Instead a second table is allocated and buckets are moved
//! over a few at a time:
//!
//! ```text
//!            rehash_cursor
//!                 │
//!   active:   [ ][ ][x][x][ ][x][x][x]      buckets < cursor are drained
//!                 ▼
//!   incoming: [ ][x][ ][ ][x][ ][ ][ ][ ][x][ ][ ][x][ ][ ][ ]
//! ```
//!
//! While the rehash runs:
//! - lookups probe `active` first, then `incoming`
//! - new keys are only ever inserted into `incoming`
//! - the cursor only moves forward; once every bucket of `active` has been
//!   migrated, `incoming` becomes `active`
//!
//! `rehash_step(n)` moves up to `n` non-empty buckets and visits at most
//! `n * 10` buckets in total, so a sparse table cannot turn a step into a
//! full scan.

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::invariant_violation;

/// Smallest table ever allocated.
pub const MIN_CAPACITY: usize = 4;

/// Empty buckets a rehash step may visit per requested bucket.
const EMPTY_VISITS_PER_STEP: usize = 10;

/// Buckets `sample` may walk per requested key before giving up.
const SAMPLE_STEPS_PER_KEY: usize = 10;

/// Buckets migrated per iteration of a time-boxed rehash.
const TIMED_REHASH_BATCH: usize = 100;

/// Sizing and growth settings for the keyspace tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyspaceConfig {
    /// Buckets allocated at startup (rounded up to a power of two).
    pub initial_capacity: usize,

    /// Grow once `len / capacity` exceeds this value (default: 1.0)
    pub resize_watermark: f64,

    /// Grow even while growth is paused once the load factor exceeds this
    /// value (default: 5.0)
    pub resize_force_ratio: f64,

    /// Non-empty buckets migrated per event loop tick (default: 100)
    pub rehash_step_buckets: usize,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            initial_capacity: MIN_CAPACITY,
            resize_watermark: 1.0,
            resize_force_ratio: 5.0,
            rehash_step_buckets: 100,
        }
    }
}

#[derive(Debug)]
struct Slot<V> {
    hash: u64,
    key: Bytes,
    value: V,
}

#[derive(Debug)]
struct Table<V> {
    buckets: Vec<Vec<Slot<V>>>,
    len: usize,
}

impl<V> Table<V> {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, Vec::new);
        Self { buckets, len: 0 }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash as usize) & self.mask()
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<&Slot<V>> {
        self.buckets[self.bucket_of(hash)]
            .iter()
            .find(|slot| slot.hash == hash && slot.key[..] == *key)
    }

    fn find_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Slot<V>> {
        let idx = self.bucket_of(hash);
        self.buckets[idx]
            .iter_mut()
            .find(|slot| slot.hash == hash && slot.key[..] == *key)
    }

    fn push(&mut self, slot: Slot<V>) {
        let idx = self.bucket_of(slot.hash);
        self.buckets[idx].push(slot);
        self.len += 1;
    }

    fn remove(&mut self, hash: u64, key: &[u8]) -> Option<Slot<V>> {
        let idx = self.bucket_of(hash);
        let chain = &mut self.buckets[idx];
        let pos = chain
            .iter()
            .position(|slot| slot.hash == hash && slot.key[..] == *key)?;
        self.len -= 1;
        Some(chain.swap_remove(pos))
    }
}

#[derive(Debug)]
struct Rehash<V> {
    incoming: Table<V>,
    cursor: usize,
}

/// Chain-length distribution of a [`Dict`].
#[derive(Debug, Clone, PartialEq)]
pub struct DictStats {
    /// Entries stored.
    pub len: usize,
    /// Buckets across both tables.
    pub buckets: usize,
    /// Buckets holding at least one entry.
    pub used_buckets: usize,
    /// Longest chain.
    pub max_chain: usize,
    /// `histogram[i]` = number of buckets with chain length `i`; the last
    /// slot aggregates every longer chain.
    pub histogram: Vec<usize>,
    /// Whether an incremental rehash is in progress.
    pub rehashing: bool,
}

impl DictStats {
    const HISTOGRAM_SLOTS: usize = 16;

    /// Average chain length over non-empty buckets.
    pub fn avg_chain(&self) -> f64 {
        if self.used_buckets == 0 {
            0.0
        } else {
            self.len as f64 / self.used_buckets as f64
        }
    }
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table size: {}", self.buckets)?;
        writeln!(f, "number of elements: {}", self.len)?;
        writeln!(f, "different slots: {}", self.used_buckets)?;
        writeln!(f, "max chain length: {}", self.max_chain)?;
        writeln!(f, "avg chain length (counted): {:.2}", self.avg_chain())?;
        writeln!(f, "rehashing: {}", self.rehashing)?;
        writeln!(f, "Chain length distribution:")?;
        for (len, &count) in self.histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = count as f64 * 100.0 / self.buckets.max(1) as f64;
            writeln!(f, "   {}: {} ({:.2}%)", len, count, pct)?;
        }
        Ok(())
    }
}

/// Hash table with incremental, bounded-latency growth.
pub struct Dict<V> {
    active: Table<V>,
    rehash: Option<Rehash<V>>,
    len: usize,
    hasher: RandomState,
    config: KeyspaceConfig,
    growth_paused: bool,
    rehash_cycles: u64,
}

impl<V> fmt::Debug for Dict<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.len)
            .field("capacity", &self.active.capacity())
            .field("rehash_cursor", &self.rehash_cursor())
            .finish()
    }
}

impl<V> Dict<V> {
    /// Creates an empty dict using the given sizing policy.
    pub fn new(config: &KeyspaceConfig) -> Self {
        Self {
            active: Table::with_capacity(config.initial_capacity),
            rehash: None,
            len: 0,
            hasher: RandomState::new(),
            config: config.clone(),
            growth_paused: false,
            rehash_cycles: 0,
        }
    }

    /// Creates an empty dict with `capacity` buckets and default growth.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&KeyspaceConfig {
            initial_capacity: capacity,
            ..Default::default()
        })
    }

    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Number of entries across both tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buckets in the active table.
    pub fn capacity(&self) -> usize {
        self.active.capacity()
    }

    pub fn is_rehashing(&self) -> bool {
        self.rehash.is_some()
    }

    /// Next bucket of `active` to migrate, or `None` when not rehashing.
    pub fn rehash_cursor(&self) -> Option<usize> {
        self.rehash.as_ref().map(|r| r.cursor)
    }

    /// Number of rehash cycles started since creation.
    pub fn rehash_cycles(&self) -> u64 {
        self.rehash_cycles
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<&Slot<V>> {
        self.active
            .find(hash, key)
            .or_else(|| self.rehash.as_ref()?.incoming.find(hash, key))
    }

    fn find_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Slot<V>> {
        if self.active.find(hash, key).is_some() {
            return self.active.find_mut(hash, key);
        }
        self.rehash.as_mut()?.incoming.find_mut(hash, key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        if self.is_empty() {
            return None;
        }
        self.find(self.hash(key), key).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        if self.is_empty() {
            return None;
        }
        let hash = self.hash(key);
        self.find_mut(hash, key).map(|slot| &mut slot.value)
    }

    /// Returns the stored key alongside its value.
    pub fn get_key_value(&self, key: &[u8]) -> Option<(&Bytes, &V)> {
        if self.is_empty() {
            return None;
        }
        self.find(self.hash(key), key)
            .map(|slot| (&slot.key, &slot.value))
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces a value, returning the previous one.
    ///
    /// New keys go to the incoming table while a rehash is running.
    pub fn insert(&mut self, key: Bytes, value: V) -> Option<V> {
        self.rehash_step_on_access();

        let hash = self.hash(&key);
        if let Some(slot) = self.find_mut(hash, &key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }

        let slot = Slot { hash, key, value };
        match self.rehash.as_mut() {
            Some(rehash) => rehash.incoming.push(slot),
            None => self.active.push(slot),
        }
        self.len += 1;
        self.expand_if_needed();
        None
    }

    /// Removes a key, returning the owned key and value.
    pub fn remove(&mut self, key: &[u8]) -> Option<(Bytes, V)> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step_on_access();

        let hash = self.hash(key);
        let slot = match self.active.remove(hash, key) {
            Some(slot) => slot,
            None => self.rehash.as_mut()?.incoming.remove(hash, key)?,
        };
        self.len -= 1;
        Some((slot.key, slot.value))
    }

    /// Drops every entry and starts over with the initial capacity.
    pub fn clear(&mut self) {
        self.active = Table::with_capacity(self.config.initial_capacity);
        self.rehash = None;
        self.len = 0;
    }

    /// Pauses or resumes growth (e.g. while a snapshot walks the table).
    ///
    /// While paused the table only grows past the force ratio.
    pub fn set_growth_paused(&mut self, paused: bool) {
        self.growth_paused = paused;
        if !paused {
            self.expand_if_needed();
        }
    }

    pub fn growth_paused(&self) -> bool {
        self.growth_paused
    }

    fn expand_if_needed(&mut self) {
        if self.rehash.is_some() {
            return;
        }
        let load = self.active.len as f64 / self.active.capacity() as f64;
        let limit = if self.growth_paused {
            self.config.resize_force_ratio
        } else {
            self.config.resize_watermark
        };
        if load > limit {
            self.start_rehash(self.active.len * 2);
        }
    }

    fn start_rehash(&mut self, target: usize) {
        let incoming = Table::with_capacity(target);
        if incoming.capacity() <= self.active.capacity() {
            return;
        }
        debug!(
            len = self.len,
            from = self.active.capacity(),
            to = incoming.capacity(),
            "Starting incremental rehash"
        );
        self.rehash = Some(Rehash {
            incoming,
            cursor: 0,
        });
        self.rehash_cycles += 1;
    }

    /// Migrates one bucket as a side effect of a mutating operation.
    #[inline]
    fn rehash_step_on_access(&mut self) {
        if self.rehash.is_some() {
            self.rehash_step(1);
        }
    }

    /// Migrates up to `n` non-empty buckets from `active` to `incoming`.
    ///
    /// Returns `true` while a rehash is still in progress afterwards.
    pub fn rehash_step(&mut self, n: usize) -> bool {
        let Some(rehash) = self.rehash.as_mut() else {
            return false;
        };

        let mut remaining = n.max(1);
        let mut empty_visits = remaining.saturating_mul(EMPTY_VISITS_PER_STEP);

        while remaining > 0 && self.active.len > 0 {
            if rehash.cursor >= self.active.capacity() {
                invariant_violation("rehash cursor ran past the active table with entries left");
            }

            let chain = std::mem::take(&mut self.active.buckets[rehash.cursor]);
            rehash.cursor += 1;

            if chain.is_empty() {
                empty_visits -= 1;
                if empty_visits == 0 {
                    return true;
                }
                continue;
            }

            self.active.len -= chain.len();
            for slot in chain {
                rehash.incoming.push(slot);
            }
            remaining -= 1;
        }

        if self.active.len == 0 {
            self.finish_rehash();
            false
        } else {
            true
        }
    }

    fn finish_rehash(&mut self) {
        let Some(rehash) = self.rehash.take() else {
            return;
        };
        if rehash.incoming.len != self.len {
            invariant_violation("key count changed across rehash");
        }
        debug!(
            len = self.len,
            capacity = rehash.incoming.capacity(),
            "Incremental rehash complete"
        );
        self.active = rehash.incoming;
    }

    /// Keeps rehashing in batches until done or `budget` has elapsed.
    ///
    /// Returns `true` while a rehash is still in progress afterwards.
    pub fn rehash_for(&mut self, budget: Duration) -> bool {
        let start = Instant::now();
        while self.rehash_step(TIMED_REHASH_BATCH) {
            if start.elapsed() >= budget {
                return true;
            }
        }
        false
    }

    /// Picks up to `count` entries starting from a random bucket.
    ///
    /// Entries in consecutive buckets are returned, so this is cheap but
    /// not perfectly uniform. When the dict is non-empty at least one entry
    /// is always returned.
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<(&Bytes, &V)> {
        let wanted = count.min(self.len);
        let mut out = Vec::with_capacity(wanted);
        if wanted == 0 {
            return out;
        }

        let incoming = self.rehash.as_ref().map(|r| &r.incoming);
        let cursor = self.rehash_cursor().unwrap_or(0);
        let mask = incoming.map_or(self.active.mask(), |t| t.mask().max(self.active.mask()));

        let mut idx = rng.random_range(0..=mask);
        let mut budget = wanted.saturating_mul(SAMPLE_STEPS_PER_KEY);
        let mut empty_run = 0usize;
        let mut linear_left = mask + 1;

        loop {
            let mut hit = false;
            for (pos, table) in std::iter::once(&self.active).chain(incoming).enumerate() {
                // drained part of the active table
                if pos == 0 && idx < cursor {
                    continue;
                }
                if idx >= table.capacity() {
                    continue;
                }
                for slot in &table.buckets[idx] {
                    out.push((&slot.key, &slot.value));
                    hit = true;
                    if out.len() == wanted {
                        return out;
                    }
                }
            }

            if budget > 0 {
                budget -= 1;
                if hit {
                    empty_run = 0;
                } else {
                    empty_run += 1;
                    if empty_run >= 5 && empty_run > wanted {
                        idx = rng.random_range(0..=mask);
                        empty_run = 0;
                        continue;
                    }
                }
            } else if !out.is_empty() || linear_left == 0 {
                return out;
            } else {
                linear_left -= 1;
            }

            idx = (idx + 1) & mask;
        }
    }

    /// Iterates over every entry in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> + '_ {
        let incoming = self.rehash.as_ref().map(|r| r.incoming.buckets.iter());
        self.active
            .buckets
            .iter()
            .chain(incoming.into_iter().flatten())
            .flat_map(|chain| chain.iter())
            .map(|slot| (&slot.key, &slot.value))
    }

    /// Visits the bucket(s) addressed by `cursor` and returns the next cursor.
    ///
    /// Uses reverse-binary cursor increments, so every key present for the
    /// whole scan is visited at least once even if the table grows between
    /// calls. A returned cursor of `0` means the scan is complete.
    pub fn scan(&self, cursor: usize, mut visit: impl FnMut(&Bytes, &V)) -> usize {
        if self.is_empty() {
            return 0;
        }

        let mut v = cursor;
        match &self.rehash {
            None => {
                let m0 = self.active.mask();
                for slot in &self.active.buckets[v & m0] {
                    visit(&slot.key, &slot.value);
                }
                v |= !m0;
                v = v.reverse_bits().wrapping_add(1).reverse_bits();
            }
            Some(rehash) => {
                let (small, large) = if self.active.capacity() <= rehash.incoming.capacity() {
                    (&self.active, &rehash.incoming)
                } else {
                    (&rehash.incoming, &self.active)
                };
                let m0 = small.mask();
                let m1 = large.mask();

                for slot in &small.buckets[v & m0] {
                    visit(&slot.key, &slot.value);
                }
                // every bucket of the larger table that expands v & m0
                loop {
                    for slot in &large.buckets[v & m1] {
                        visit(&slot.key, &slot.value);
                    }
                    v |= !m1;
                    v = v.reverse_bits().wrapping_add(1).reverse_bits();
                    if v & (m0 ^ m1) == 0 {
                        break;
                    }
                }
            }
        }
        v
    }

    /// Measures the bucket chain-length distribution.
    pub fn stats(&self) -> DictStats {
        let mut histogram = vec![0usize; DictStats::HISTOGRAM_SLOTS + 1];
        let mut buckets = 0;
        let mut used_buckets = 0;
        let mut max_chain = 0;

        let incoming = self.rehash.as_ref().map(|r| r.incoming.buckets.iter());
        for chain in self.active.buckets.iter().chain(incoming.into_iter().flatten()) {
            buckets += 1;
            let len = chain.len();
            if len > 0 {
                used_buckets += 1;
            }
            max_chain = max_chain.max(len);
            histogram[len.min(DictStats::HISTOGRAM_SLOTS)] += 1;
        }

        DictStats {
            len: self.len,
            buckets,
            used_buckets,
            max_chain,
            histogram,
            rehashing: self.is_rehashing(),
        }
    }
}
