//! Memory-Bounded Eviction
//!
//! When a write would push estimated usage over the configured ceiling,
//! keys are evicted *before* the write lands, so usage never exceeds the
//! budget after a successful write.
//!
//! Victims are chosen by sampling rather than by maintaining an ordered
//! structure: each round samples a handful of keys and drops the best
//! candidate among them.
//!
//! | Policy            | Domain         | Best candidate                 |
//! |-------------------|----------------|--------------------------------|
//! | `allkeys-lru`     | every key      | longest idle                   |
//! | `volatile-lru`    | keys with TTL  | longest idle                   |
//! | `allkeys-lfu`     | every key      | lowest decayed access counter  |
//! | `volatile-lfu`    | keys with TTL  | lowest decayed access counter  |
//! | `allkeys-random`  | every key      | any                            |
//! | `volatile-random` | keys with TTL  | any                            |
//! | `volatile-ttl`    | keys with TTL  | earliest deadline              |
//! | `noeviction`      | none           | writes fail with OOM           |
//!
//! ## LFU Counters
//!
//! The access counter is an 8-bit logarithmic counter: a hit increments it
//! with probability `1 / ((counter - 5) * log_factor + 1)`, and it decays by
//! one for every `decay_time` minutes without access. New keys start at 5 so
//! they are not evicted before they had a chance to be read.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{invariant_violation, OutOfMemory};
use crate::storage::dict::Dict;
use crate::storage::expiry::ExpiryManager;
use crate::storage::memory::{self, MemoryBudget};
use crate::storage::value::Entry;

/// Counter value given to new keys under LFU.
pub const LFU_INIT_VAL: u8 = 5;

const MS_PER_MINUTE: u64 = 60_000;

/// Which keys may be evicted and how the victim is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    #[default]
    #[serde(rename = "noeviction")]
    NoEviction,
    AllkeysLru,
    VolatileLru,
    AllkeysLfu,
    VolatileLfu,
    AllkeysRandom,
    VolatileRandom,
    VolatileTtl,
}

impl EvictionPolicy {
    pub const ALL: [EvictionPolicy; 8] = [
        EvictionPolicy::NoEviction,
        EvictionPolicy::AllkeysLru,
        EvictionPolicy::VolatileLru,
        EvictionPolicy::AllkeysLfu,
        EvictionPolicy::VolatileLfu,
        EvictionPolicy::AllkeysRandom,
        EvictionPolicy::VolatileRandom,
        EvictionPolicy::VolatileTtl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::AllkeysLru => "allkeys-lru",
            EvictionPolicy::VolatileLru => "volatile-lru",
            EvictionPolicy::AllkeysLfu => "allkeys-lfu",
            EvictionPolicy::VolatileLfu => "volatile-lfu",
            EvictionPolicy::AllkeysRandom => "allkeys-random",
            EvictionPolicy::VolatileRandom => "volatile-random",
            EvictionPolicy::VolatileTtl => "volatile-ttl",
        }
    }

    /// Only keys with an expiry are candidates.
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLru
                | EvictionPolicy::VolatileLfu
                | EvictionPolicy::VolatileRandom
                | EvictionPolicy::VolatileTtl
        )
    }

    pub fn is_lfu(&self) -> bool {
        matches!(self, EvictionPolicy::AllkeysLfu | EvictionPolicy::VolatileLfu)
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvictionPolicy::ALL
            .into_iter()
            .find(|policy| policy.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown eviction policy '{}'", s))
    }
}

/// Memory ceiling and eviction tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Estimated byte ceiling; 0 disables the limit (default: 0)
    pub max_bytes: usize,

    /// Eviction policy (default: noeviction)
    pub policy: EvictionPolicy,

    /// Keys sampled per eviction round (default: 5)
    pub samples: usize,

    /// LFU counter growth damping (default: 10)
    pub lfu_log_factor: u32,

    /// Minutes of inactivity per LFU counter decrement; 0 disables decay
    /// (default: 1)
    pub lfu_decay_time: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            max_bytes: 0,
            policy: EvictionPolicy::NoEviction,
            samples: 5,
            lfu_log_factor: 10,
            lfu_decay_time: 1,
        }
    }
}

/// Per-entry access metadata, interpreted by the configured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMeta {
    /// Logical clock tick of the last access.
    Lru(u64),
    /// Logarithmic access counter and the minute it was last decremented.
    Lfu { counter: u8, decremented_at: u16 },
}

/// Minutes since the epoch, wrapped to 16 bits.
fn lfu_minutes(now_ms: u64) -> u16 {
    ((now_ms / MS_PER_MINUTE) & 0xFFFF) as u16
}

fn lfu_elapsed_minutes(since: u16, now: u16) -> u64 {
    if now >= since {
        (now - since) as u64
    } else {
        (u16::MAX - since) as u64 + now as u64
    }
}

/// Counter after applying decay for the minutes elapsed since `decremented_at`.
pub fn lfu_decayed(counter: u8, decremented_at: u16, now_ms: u64, decay_time: u64) -> u8 {
    if decay_time == 0 {
        return counter;
    }
    let periods = lfu_elapsed_minutes(decremented_at, lfu_minutes(now_ms)) / decay_time;
    counter.saturating_sub(periods.min(u8::MAX as u64) as u8)
}

/// Probabilistic logarithmic increment.
pub fn lfu_log_incr<R: Rng + ?Sized>(counter: u8, log_factor: u32, rng: &mut R) -> u8 {
    if counter == u8::MAX {
        return counter;
    }
    let base = counter.saturating_sub(LFU_INIT_VAL) as f64;
    let p = 1.0 / (base * log_factor as f64 + 1.0);
    if rng.random::<f64>() < p {
        counter + 1
    } else {
        counter
    }
}

/// Keys and bytes freed by one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub keys: usize,
    pub bytes: usize,
}

/// Cumulative eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    pub evicted_keys: u64,
    pub evicted_bytes: u64,
    /// Writes refused with OOM.
    pub rejected_writes: u64,
}

/// Chooses and removes victims, and maintains access metadata.
#[derive(Debug)]
pub struct EvictionManager {
    config: EvictionConfig,
    lru_clock: u64,
    rng: SmallRng,
    stats: EvictionStats,
}

impl EvictionManager {
    pub fn new(config: &EvictionConfig) -> Self {
        Self {
            config: config.clone(),
            lru_clock: 0,
            rng: SmallRng::from_os_rng(),
            stats: EvictionStats::default(),
        }
    }

    pub fn config(&self) -> &EvictionConfig {
        &self.config
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    pub fn stats(&self) -> EvictionStats {
        self.stats
    }

    /// Metadata for a freshly created entry.
    pub fn new_access(&mut self, now_ms: u64) -> AccessMeta {
        if self.config.policy.is_lfu() {
            AccessMeta::Lfu {
                counter: LFU_INIT_VAL,
                decremented_at: lfu_minutes(now_ms),
            }
        } else {
            self.lru_clock += 1;
            AccessMeta::Lru(self.lru_clock)
        }
    }

    /// Records an access to an existing entry.
    pub fn touch(&mut self, meta: &mut AccessMeta, now_ms: u64) {
        match meta {
            AccessMeta::Lru(tick) => {
                self.lru_clock += 1;
                *tick = self.lru_clock;
            }
            AccessMeta::Lfu {
                counter,
                decremented_at,
            } => {
                let decayed =
                    lfu_decayed(*counter, *decremented_at, now_ms, self.config.lfu_decay_time);
                *counter = lfu_log_incr(decayed, self.config.lfu_log_factor, &mut self.rng);
                *decremented_at = lfu_minutes(now_ms);
            }
        }
    }

    /// Logical ticks since the entry was last touched (OBJECT IDLETIME).
    pub fn idle_ticks(&self, meta: AccessMeta) -> Option<u64> {
        match meta {
            AccessMeta::Lru(tick) => Some(self.lru_clock.saturating_sub(tick)),
            AccessMeta::Lfu { .. } => None,
        }
    }

    /// Decayed access counter (OBJECT FREQ).
    pub fn frequency(&self, meta: AccessMeta, now_ms: u64) -> Option<u8> {
        match meta {
            AccessMeta::Lfu {
                counter,
                decremented_at,
            } => Some(lfu_decayed(
                counter,
                decremented_at,
                now_ms,
                self.config.lfu_decay_time,
            )),
            AccessMeta::Lru(_) => None,
        }
    }

    /// Higher means a better eviction candidate.
    fn score(&self, meta: AccessMeta, now_ms: u64) -> u64 {
        match meta {
            AccessMeta::Lru(tick) => self.lru_clock.saturating_sub(tick),
            AccessMeta::Lfu {
                counter,
                decremented_at,
            } => {
                let freq = lfu_decayed(counter, decremented_at, now_ms, self.config.lfu_decay_time);
                (u8::MAX - freq) as u64
            }
        }
    }

    /// Evicts until `incoming` more bytes fit under the budget.
    ///
    /// `protect` is never chosen as a victim. Fails with [`OutOfMemory`]
    /// when the policy is `noeviction` or no candidate is left.
    pub fn evict_until_under_budget(
        &mut self,
        entries: &mut Dict<Entry>,
        expiry: &mut ExpiryManager,
        memory: &mut MemoryBudget,
        incoming: usize,
        protect: Option<&[u8]>,
        now_ms: u64,
    ) -> Result<EvictionReport, OutOfMemory> {
        let mut report = EvictionReport::default();
        if !memory.would_exceed(incoming) {
            return Ok(report);
        }
        if self.config.policy == EvictionPolicy::NoEviction {
            self.stats.rejected_writes += 1;
            return Err(OutOfMemory);
        }

        while memory.would_exceed(incoming) {
            let Some(victim) = self.pick_victim(entries, expiry, protect, now_ms) else {
                warn!(
                    policy = %self.config.policy,
                    used = memory.used(),
                    max = memory.max_bytes(),
                    incoming,
                    "No eviction candidate left, rejecting write"
                );
                self.stats.rejected_writes += 1;
                self.record(report);
                return Err(OutOfMemory);
            };

            let Some((key, entry)) = entries.remove(&victim) else {
                invariant_violation("eviction candidate missing from keyspace");
            };
            expiry.remove(&key);
            let size = memory::entry_size(&key, &entry.value);
            memory.release(size);
            report.keys += 1;
            report.bytes += size;
        }

        self.record(report);
        debug!(
            policy = %self.config.policy,
            keys = report.keys,
            bytes = report.bytes,
            used = memory.used(),
            "Evicted keys to make room for write"
        );
        Ok(report)
    }

    fn record(&mut self, report: EvictionReport) {
        self.stats.evicted_keys += report.keys as u64;
        self.stats.evicted_bytes += report.bytes as u64;
    }

    fn pick_victim(
        &mut self,
        entries: &Dict<Entry>,
        expiry: &ExpiryManager,
        protect: Option<&[u8]>,
        now_ms: u64,
    ) -> Option<Bytes> {
        let policy = self.config.policy;
        // one extra so the protected key cannot crowd out every candidate
        let samples = self
            .config
            .samples
            .max(1)
            .saturating_add(protect.is_some() as usize);
        let is_protected = |key: &Bytes| protect.is_some_and(|p| key[..] == *p);

        let candidates: Vec<(Bytes, u64)> = if policy.is_volatile() {
            expiry
                .sample(samples, &mut self.rng)
                .into_iter()
                .filter(|(key, _)| !is_protected(key))
                .filter_map(|(key, at)| {
                    let score = match policy {
                        EvictionPolicy::VolatileTtl => u64::MAX - at,
                        EvictionPolicy::VolatileRandom => 0,
                        _ => self.score(entries.get(key)?.access, now_ms),
                    };
                    Some((key.clone(), score))
                })
                .collect()
        } else {
            entries
                .sample(samples, &mut self.rng)
                .into_iter()
                .filter(|(key, _)| !is_protected(key))
                .map(|(key, entry)| {
                    let score = match policy {
                        EvictionPolicy::AllkeysRandom => 0,
                        _ => self.score(entry.access, now_ms),
                    };
                    (key.clone(), score)
                })
                .collect()
        };

        if candidates.is_empty() {
            return None;
        }
        if matches!(
            policy,
            EvictionPolicy::AllkeysRandom | EvictionPolicy::VolatileRandom
        ) {
            let idx = self.rng.random_range(0..candidates.len());
            return candidates.into_iter().nth(idx).map(|(key, _)| key);
        }
        candidates
            .into_iter()
            .max_by_key(|(_, score)| *score)
            .map(|(key, _)| key)
    }
}
