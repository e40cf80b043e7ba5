//! Key Expiry
//!
//! Expiry timestamps live in their own [`Dict`], keyed like the main table
//! and holding absolute unix milliseconds. Keys without a TTL cost nothing
//! here.
//!
//! Two mechanisms remove expired keys:
//!
//! - **Lazy expiry**: every store lookup checks the key's deadline first and
//!   deletes it on the spot if it has passed.
//! - **Active expiry**: lazy expiry alone leaks keys that expire and are
//!   never touched again, so the event loop runs a bounded sweep every tick.
//!
//! ## Active Sweep
//!
//! Each step samples up to `samples` keys that carry a TTL and deletes the
//! expired ones. If more than `threshold` of the sample was expired the
//! keyspace is probably full of dead keys, so the step samples again, until
//! the per-tick time budget runs out.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::storage::dict::{Dict, KeyspaceConfig};

/// Configuration for active expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Keys sampled per sweep round (default: 20)
    pub samples: usize,

    /// Sample again while more than this fraction was expired (default: 0.25)
    pub threshold: f64,

    /// Wall-clock budget for one sweep step, in microseconds (default: 1000)
    pub time_budget_us: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            samples: 20,
            threshold: 0.25,
            time_budget_us: 1000,
        }
    }
}

impl ExpiryConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_micros(self.time_budget_us)
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Outcome of one active sweep step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sampling rounds run.
    pub rounds: usize,
    /// Keys inspected.
    pub sampled: usize,
    /// Keys deleted.
    pub expired: usize,
    /// The time budget ran out while the expired ratio was still high.
    pub more: bool,
}

/// Per-key expiry deadlines plus the active sweep.
#[derive(Debug)]
pub struct ExpiryManager {
    deadlines: Dict<u64>,
    config: ExpiryConfig,
    rng: SmallRng,
    expired_total: u64,
}

impl ExpiryManager {
    pub fn new(config: &ExpiryConfig, keyspace: &KeyspaceConfig) -> Self {
        Self {
            deadlines: Dict::new(keyspace),
            config: config.clone(),
            rng: SmallRng::from_os_rng(),
            expired_total: 0,
        }
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// Sets the deadline for `key`, returning the previous one.
    pub fn set(&mut self, key: Bytes, at_ms: u64) -> Option<u64> {
        self.deadlines.insert(key, at_ms)
    }

    pub fn get(&self, key: &[u8]) -> Option<u64> {
        self.deadlines.get(key).copied()
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<u64> {
        self.deadlines.remove(key).map(|(_, at)| at)
    }

    /// A key is expired once its deadline is at or before `now_ms`.
    pub fn is_expired(&self, key: &[u8], now_ms: u64) -> bool {
        self.get(key).is_some_and(|at| at <= now_ms)
    }

    /// Keys carrying a deadline.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Keys removed by expiry so far, lazy and active.
    pub fn expired_total(&self) -> u64 {
        self.expired_total
    }

    /// Counts a key removed by lazy expiry.
    pub(crate) fn record_lazy_expiry(&mut self) {
        self.expired_total += 1;
    }

    /// Random keys with their deadlines, used by the volatile eviction
    /// policies.
    pub(crate) fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<(&Bytes, u64)> {
        self.deadlines
            .sample(count, rng)
            .into_iter()
            .map(|(key, at)| (key, *at))
            .collect()
    }

    pub fn rehash_step(&mut self, n: usize) -> bool {
        self.deadlines.rehash_step(n)
    }

    pub fn rehash_for(&mut self, budget: Duration) -> bool {
        self.deadlines.rehash_for(budget)
    }

    pub fn is_rehashing(&self) -> bool {
        self.deadlines.is_rehashing()
    }

    pub fn set_growth_paused(&mut self, paused: bool) {
        self.deadlines.set_growth_paused(paused);
    }

    /// Runs one bounded active-expiry step.
    ///
    /// Every expired key found is dropped from the deadline table and
    /// handed to `remove`, which must delete it from the main table.
    pub fn active_sweep_step(&mut self, now_ms: u64, mut remove: impl FnMut(&Bytes)) -> SweepReport {
        let mut report = SweepReport::default();
        if self.deadlines.is_empty() {
            return report;
        }

        let start = Instant::now();
        let budget = self.config.time_budget();
        let samples = self.config.samples.max(1);

        loop {
            let sample = self.deadlines.sample(samples, &mut self.rng);
            let sampled = sample.len();
            let expired: Vec<Bytes> = sample
                .into_iter()
                .filter(|(_, at)| **at <= now_ms)
                .map(|(key, _)| key.clone())
                .collect();

            for key in &expired {
                self.deadlines.remove(key);
                remove(key);
            }

            report.rounds += 1;
            report.sampled += sampled;
            report.expired += expired.len();

            if sampled == 0 || (expired.len() as f64) <= sampled as f64 * self.config.threshold {
                break;
            }
            if start.elapsed() >= budget {
                report.more = true;
                break;
            }
        }

        self.expired_total += report.expired as u64;
        if report.expired > 0 {
            debug!(
                expired = report.expired,
                sampled = report.sampled,
                rounds = report.rounds,
                remaining = self.deadlines.len(),
                "Active expiry removed keys"
            );
        } else {
            trace!(sampled = report.sampled, "Active expiry found nothing");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ExpiryManager {
        ExpiryManager::new(&ExpiryConfig::default(), &KeyspaceConfig::default())
    }

    #[test]
    fn test_set_get_remove() {
        let mut expiry = manager();
        assert_eq!(expiry.set(Bytes::from("a"), 100), None);
        assert_eq!(expiry.set(Bytes::from("a"), 200), Some(100));
        assert_eq!(expiry.get(b"a"), Some(200));
        assert_eq!(expiry.len(), 1);

        assert!(!expiry.is_expired(b"a", 199));
        assert!(expiry.is_expired(b"a", 200));
        assert!(!expiry.is_expired(b"missing", u64::MAX));

        assert_eq!(expiry.remove(b"a"), Some(200));
        assert!(expiry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut expiry = manager();
        for i in 0..50 {
            expiry.set(Bytes::from(format!("dead:{}", i)), 10);
        }
        for i in 0..5 {
            expiry.set(Bytes::from(format!("live:{}", i)), 1_000);
        }

        let mut removed = Vec::new();
        let mut total = 0;
        for _ in 0..100 {
            let report = expiry.active_sweep_step(500, |key| removed.push(key.clone()));
            total += report.expired;
            if expiry.len() == 5 {
                break;
            }
        }

        assert_eq!(total, 50);
        assert_eq!(expiry.len(), 5);
        assert_eq!(expiry.expired_total(), 50);
        assert!(removed.iter().all(|k| k.starts_with(b"dead:")));
        for i in 0..5 {
            assert_eq!(expiry.get(format!("live:{}", i).as_bytes()), Some(1_000));
        }
    }

    #[test]
    fn test_sweep_repeats_while_ratio_high() {
        let config = ExpiryConfig {
            samples: 4,
            time_budget_us: 1_000_000,
            ..Default::default()
        };
        let mut expiry = ExpiryManager::new(&config, &KeyspaceConfig::default());
        for i in 0..40 {
            expiry.set(Bytes::from(format!("k{}", i)), 1);
        }

        let report = expiry.active_sweep_step(2, |_| {});
        assert!(report.rounds > 1);
        assert_eq!(report.expired, 40);
        assert!(expiry.is_empty());
    }

    #[test]
    fn test_sweep_on_empty_is_noop() {
        let mut expiry = manager();
        assert_eq!(expiry.active_sweep_step(now_ms(), |_| {}), SweepReport::default());
    }
}
