//! The Keyspace Store
//!
//! `Store` owns one logical database: the primary [`Dict`] of entries, the
//! [`ExpiryManager`] with per-key deadlines, the [`EvictionManager`] and the
//! [`MemoryBudget`]. It is plain owned state with no locks; the event loop
//! thread is the only one that ever touches it.
//!
//! ## Invariants
//!
//! - An expired key is never returned. Every lookup path checks the key's
//!   deadline first and deletes the entry on the spot if it has passed.
//! - A key has a deadline only while it exists in the main table.
//! - Writes reserve their extra bytes *before* they land. If eviction cannot
//!   make room the write fails with [`OutOfMemory`] and nothing changes.
//! - `dirty` moves whenever a write changed the keyspace. Evictions and
//!   expirations do not move it.

use bytes::Bytes;
use std::time::Duration;
use tracing::trace;

use crate::config::EngineConfig;
use crate::error::OutOfMemory;
use crate::storage::dict::{Dict, DictStats};
use crate::storage::eviction::{AccessMeta, EvictionManager, EvictionPolicy};
use crate::storage::expiry::{now_ms, ExpiryManager, SweepReport};
use crate::storage::glob::GlobPattern;
use crate::storage::memory::{self, MemoryBudget};
use crate::storage::value::{Entry, Value};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlResult {
    NotFound,
    NoExpiry,
    /// Milliseconds left.
    Remaining(u64),
}

/// One live entry as seen by a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotEntry<'a> {
    pub key: &'a Bytes,
    pub value: &'a Value,
    /// Absolute unix milliseconds.
    pub expires_at: Option<u64>,
}

/// Keyspace statistics for INFO.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub keys: usize,
    pub keys_with_expiry: usize,
    pub used_memory: usize,
    pub max_memory: usize,
    pub policy: EvictionPolicy,
    pub hits: u64,
    pub misses: u64,
    pub expired_keys: u64,
    pub evicted_keys: u64,
    pub evicted_bytes: u64,
    pub rejected_writes: u64,
    pub capacity: usize,
    pub rehashing: bool,
    pub rehash_cycles: u64,
    pub dirty: u64,
}

/// One logical database.
#[derive(Debug)]
pub struct Store {
    id: usize,
    entries: Dict<Entry>,
    expiry: ExpiryManager,
    eviction: EvictionManager,
    memory: MemoryBudget,
    hits: u64,
    misses: u64,
    dirty: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(0, &EngineConfig::default())
    }
}

impl Store {
    pub fn new(id: usize, config: &EngineConfig) -> Self {
        Self {
            id,
            entries: Dict::new(&config.keyspace),
            expiry: ExpiryManager::new(&config.expiry, &config.keyspace),
            eviction: EvictionManager::new(&config.memory),
            memory: MemoryBudget::new(config.memory.max_bytes),
            hits: 0,
            misses: 0,
            dirty: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Entries in the main table, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of keyspace changes made by writes.
    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    pub fn memory(&self) -> &MemoryBudget {
        &self.memory
    }

    pub fn eviction(&self) -> &EvictionManager {
        &self.eviction
    }

    pub fn expiry(&self) -> &ExpiryManager {
        &self.expiry
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    /// Deletes `key` if its deadline has passed. Returns `true` if it did.
    fn expire_if_needed(&mut self, key: &[u8], now: u64) -> bool {
        if !self.expiry.is_expired(key, now) {
            return false;
        }
        self.remove_entry(key);
        self.expiry.record_lazy_expiry();
        trace!(key = %String::from_utf8_lossy(key), "Lazily expired key");
        true
    }

    /// Removes an entry along with its deadline and memory charge.
    fn remove_entry(&mut self, key: &[u8]) -> Option<(Bytes, Entry)> {
        let (key, entry) = self.entries.remove(key)?;
        self.expiry.remove(&key);
        self.memory.release(memory::entry_size(&key, &entry.value));
        Some((key, entry))
    }

    /// Makes room for `incoming` more bytes, never evicting `key`.
    fn reserve(&mut self, key: &[u8], incoming: usize, now: u64) -> Result<(), OutOfMemory> {
        if incoming == 0 {
            return Ok(());
        }
        self.eviction.evict_until_under_budget(
            &mut self.entries,
            &mut self.expiry,
            &mut self.memory,
            incoming,
            Some(key),
            now,
        )?;
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Looks up a key and records the access for eviction.
    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        let now = now_ms();
        if self.expire_if_needed(key, now) {
            self.misses += 1;
            return None;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.hits += 1;
                self.eviction.touch(&mut entry.access, now);
                Some(&entry.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up a key without recording an access.
    pub fn peek(&mut self, key: &[u8]) -> Option<&Value> {
        if self.expire_if_needed(key, now_ms()) {
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        !self.expire_if_needed(key, now_ms()) && self.entries.contains_key(key)
    }

    /// Access metadata of a live key (OBJECT FREQ / IDLETIME).
    pub fn access_meta(&mut self, key: &[u8]) -> Option<AccessMeta> {
        if self.expire_if_needed(key, now_ms()) {
            return None;
        }
        self.entries.get(key).map(|entry| entry.access)
    }

    /// Absolute deadline of a live key.
    pub fn expires_at(&mut self, key: &[u8]) -> Option<u64> {
        if self.expire_if_needed(key, now_ms()) {
            return None;
        }
        self.expiry.get(key)
    }

    pub fn ttl(&mut self, key: &[u8]) -> TtlResult {
        let now = now_ms();
        if self.expire_if_needed(key, now) || !self.entries.contains_key(key) {
            return TtlResult::NotFound;
        }
        match self.expiry.get(key) {
            Some(at) => TtlResult::Remaining(at.saturating_sub(now)),
            None => TtlResult::NoExpiry,
        }
    }

    /// Live keys matching `pattern`.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let now = now_ms();
        let pattern = GlobPattern::new(pattern);
        self.entries
            .iter()
            .filter(|(key, _)| !self.expiry.is_expired(key, now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Incremental iteration over the keyspace.
    ///
    /// Returns the next cursor (`0` when complete) and the keys found. Keys
    /// present for the whole scan are returned at least once, even if the
    /// table grows between calls.
    pub fn scan(
        &mut self,
        cursor: usize,
        count: usize,
        pattern: Option<&GlobPattern>,
    ) -> (usize, Vec<Bytes>) {
        let count = count.max(1);
        let mut found = Vec::new();
        let mut cursor = cursor;
        let mut visits = count.saturating_mul(10);

        loop {
            cursor = self.entries.scan(cursor, |key, _| found.push(key.clone()));
            visits -= 1;
            if cursor == 0 || visits == 0 || found.len() >= count {
                break;
            }
        }

        let now = now_ms();
        found.retain(|key| !self.expire_if_needed(key, now));
        if let Some(pattern) = pattern {
            found.retain(|key| pattern.matches(key));
        }
        (cursor, found)
    }

    /// Iterates over live entries with their deadlines.
    ///
    /// The store cannot be mutated while the iterator is alive. Pair with
    /// [`Store::set_growth_paused`] when the snapshot is consumed in
    /// several slices.
    pub fn snapshot_iter(&self) -> impl Iterator<Item = SnapshotEntry<'_>> + '_ {
        let now = now_ms();
        self.entries.iter().filter_map(move |(key, entry)| {
            let expires_at = self.expiry.get(key);
            if expires_at.is_some_and(|at| at <= now) {
                return None;
            }
            Some(SnapshotEntry {
                key,
                value: &entry.value,
                expires_at,
            })
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts or replaces `key`.
    ///
    /// `expires_at` is an absolute unix-ms deadline; `None` clears any
    /// existing TTL.
    pub fn set(
        &mut self,
        key: Bytes,
        value: Value,
        expires_at: Option<u64>,
    ) -> Result<(), OutOfMemory> {
        let now = now_ms();
        self.expire_if_needed(&key, now);

        let new_size = memory::entry_size(&key, &value);
        let old_size = self
            .entries
            .get(&key)
            .map(|entry| memory::entry_size(&key, &entry.value));
        self.reserve(&key, new_size.saturating_sub(old_size.unwrap_or(0)), now)?;

        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                self.eviction.touch(&mut entry.access, now);
                self.memory.adjust(old_size.unwrap_or(0), new_size);
            }
            None => {
                let access = self.eviction.new_access(now);
                self.entries.insert(key.clone(), Entry { value, access });
                self.memory.charge(new_size);
            }
        }

        match expires_at {
            Some(at) => {
                self.expiry.set(key, at);
            }
            None => {
                self.expiry.remove(&key);
            }
        }
        self.dirty += 1;
        Ok(())
    }

    /// Replaces the value of `key`, keeping its TTL.
    pub fn overwrite(&mut self, key: Bytes, value: Value) -> Result<(), OutOfMemory> {
        let deadline = self.expires_at(&key);
        self.set(key, value, deadline)
    }

    /// Mutates a live value in place.
    ///
    /// `growth` is the number of bytes the mutation adds and is reserved
    /// up front. `f` is expected to change the value. A list left empty by
    /// `f` is deleted. Returns `Ok(None)` if the key does not exist.
    pub fn modify<T>(
        &mut self,
        key: &[u8],
        growth: usize,
        f: impl FnOnce(&mut Value) -> T,
    ) -> Result<Option<T>, OutOfMemory> {
        let now = now_ms();
        if self.expire_if_needed(key, now) || !self.entries.contains_key(key) {
            return Ok(None);
        }
        self.reserve(key, growth, now)?;

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        let old_size = memory::entry_size(key, &entry.value);
        let out = f(&mut entry.value);
        let new_size = memory::entry_size(key, &entry.value);
        self.eviction.touch(&mut entry.access, now);
        let drained = matches!(&entry.value, Value::List(items) if items.is_empty());
        self.memory.adjust(old_size, new_size);

        if drained {
            self.remove_entry(key);
        }
        self.dirty += 1;
        Ok(Some(out))
    }

    /// Removes `key`. Returns `true` if a live key was deleted.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        if self.expire_if_needed(key, now_ms()) {
            return false;
        }
        let removed = self.remove_entry(key).is_some();
        if removed {
            self.dirty += 1;
        }
        removed
    }

    /// Sets an absolute deadline. A deadline already in the past deletes the
    /// key. Returns `false` if the key does not exist.
    pub fn expire_at(&mut self, key: &[u8], at_ms: u64) -> bool {
        let now = now_ms();
        if self.expire_if_needed(key, now) {
            return false;
        }
        let Some((stored, _)) = self.entries.get_key_value(key) else {
            return false;
        };
        let stored = stored.clone();

        if at_ms <= now {
            self.remove_entry(key);
        } else {
            self.expiry.set(stored, at_ms);
        }
        self.dirty += 1;
        true
    }

    /// Clears the deadline of `key`. Returns `true` if one was removed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.expire_if_needed(key, now_ms()) {
            return false;
        }
        let removed = self.expiry.remove(key).is_some();
        if removed {
            self.dirty += 1;
        }
        removed
    }

    /// Moves `src` to `dst`, carrying its TTL and replacing whatever `dst`
    /// held. Returns `Ok(false)` if `src` does not exist.
    pub fn rename(&mut self, src: &[u8], dst: Bytes) -> Result<bool, OutOfMemory> {
        let now = now_ms();
        if self.expire_if_needed(src, now) || !self.entries.contains_key(src) {
            return Ok(false);
        }
        if src == &dst[..] {
            return Ok(true);
        }
        self.expire_if_needed(&dst, now);
        self.reserve(src, dst.len().saturating_sub(src.len()), now)?;

        let deadline = self.expiry.get(src);
        let Some((_, entry)) = self.remove_entry(src) else {
            return Ok(false);
        };
        self.remove_entry(&dst);

        self.memory.charge(memory::entry_size(&dst, &entry.value));
        self.entries.insert(dst.clone(), entry);
        if let Some(at) = deadline {
            self.expiry.set(dst, at);
        }
        self.dirty += 1;
        Ok(true)
    }

    /// Drops every key. Returns how many were removed.
    ///
    /// Always counts as a change, even on an empty keyspace.
    pub fn flush(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.expiry.clear();
        self.memory.reset();
        self.dirty += (removed as u64).max(1);
        removed
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Advances any in-progress rehash by up to `n` buckets per table.
    ///
    /// Returns `true` while a rehash is still in progress.
    pub fn rehash_step(&mut self, n: usize) -> bool {
        let entries = self.entries.rehash_step(n);
        let deadlines = self.expiry.rehash_step(n);
        entries || deadlines
    }

    /// Rehashes for at most about `budget` per table.
    pub fn rehash_for(&mut self, budget: Duration) -> bool {
        let entries = self.entries.rehash_for(budget);
        let deadlines = self.expiry.rehash_for(budget);
        entries || deadlines
    }

    pub fn is_rehashing(&self) -> bool {
        self.entries.is_rehashing() || self.expiry.is_rehashing()
    }

    /// Pauses table growth, e.g. while a snapshot is being taken.
    pub fn set_growth_paused(&mut self, paused: bool) {
        self.entries.set_growth_paused(paused);
        self.expiry.set_growth_paused(paused);
    }

    /// Runs one bounded active-expiry step.
    pub fn active_expire_step(&mut self) -> SweepReport {
        let entries = &mut self.entries;
        let budget = &mut self.memory;
        self.expiry.active_sweep_step(now_ms(), |key| {
            if let Some((key, entry)) = entries.remove(key) {
                budget.release(memory::entry_size(&key, &entry.value));
            }
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn dict_stats(&self) -> DictStats {
        self.entries.stats()
    }

    pub fn stats(&self) -> StoreStats {
        let eviction = self.eviction.stats();
        StoreStats {
            keys: self.entries.len(),
            keys_with_expiry: self.expiry.len(),
            used_memory: self.memory.used(),
            max_memory: self.memory.max_bytes(),
            policy: self.eviction.policy(),
            hits: self.hits,
            misses: self.misses,
            expired_keys: self.expiry.expired_total(),
            evicted_keys: eviction.evicted_keys,
            evicted_bytes: eviction.evicted_bytes,
            rejected_writes: eviction.rejected_writes,
            capacity: self.entries.capacity(),
            rehashing: self.is_rehashing(),
            rehash_cycles: self.entries.rehash_cycles(),
            dirty: self.dirty,
        }
    }
}
