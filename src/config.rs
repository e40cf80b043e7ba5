//! Engine Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! hz = 10
//! log_level = "info"
//!
//! [keyspace]
//! initial_capacity = 4
//! resize_watermark = 1.0
//! resize_force_ratio = 5.0
//! rehash_step_buckets = 100
//!
//! [expiry]
//! samples = 20
//! threshold = 0.25
//! time_budget_us = 1000
//!
//! [memory]
//! max_bytes = 0
//! policy = "noeviction"
//! samples = 5
//! lfu_log_factor = 10
//! lfu_decay_time = 1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::storage::{EvictionConfig, ExpiryConfig, KeyspaceConfig};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Housekeeping cron frequency per second
    pub hz: u32,

    /// Log level
    pub log_level: String,

    /// Hash table sizing
    pub keyspace: KeyspaceConfig,

    /// Active expiry tuning
    pub expiry: ExpiryConfig,

    /// Memory ceiling and eviction
    pub memory: EvictionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hz: 10,
            log_level: "info".to_string(),
            keyspace: KeyspaceConfig::default(),
            expiry: ExpiryConfig::default(),
            memory: EvictionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hz == 0 || self.hz > 500 {
            anyhow::bail!("hz must be between 1 and 500");
        }

        let keyspace = &self.keyspace;
        if keyspace.initial_capacity == 0 {
            anyhow::bail!("keyspace.initial_capacity must be > 0");
        }
        if keyspace.resize_watermark <= 0.0 {
            anyhow::bail!("keyspace.resize_watermark must be > 0");
        }
        if keyspace.resize_force_ratio < keyspace.resize_watermark {
            anyhow::bail!("keyspace.resize_force_ratio must be >= resize_watermark");
        }
        if keyspace.rehash_step_buckets == 0 {
            anyhow::bail!("keyspace.rehash_step_buckets must be > 0");
        }

        if self.expiry.samples == 0 {
            anyhow::bail!("expiry.samples must be > 0");
        }
        if !(0.0..=1.0).contains(&self.expiry.threshold) {
            anyhow::bail!("expiry.threshold must be within [0, 1]");
        }

        if self.memory.samples == 0 {
            anyhow::bail!("memory.samples must be > 0");
        }

        Ok(())
    }

    /// Interval between two cron runs.
    pub fn cron_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.hz.max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EvictionPolicy;

    #[test]
    fn test_empty_toml_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cron_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            hz = 50

            [memory]
            max_bytes = 1048576
            policy = "allkeys-lfu"

            [keyspace]
            initial_capacity = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.hz, 50);
        assert_eq!(config.memory.max_bytes, 1 << 20);
        assert_eq!(config.memory.policy, EvictionPolicy::AllkeysLfu);
        assert_eq!(config.memory.samples, 5);
        assert_eq!(config.keyspace.initial_capacity, 1024);
        assert_eq!(config.keyspace.resize_watermark, 1.0);
        assert_eq!(config.expiry.samples, 20);
    }

    #[test]
    fn test_policy_names_match_redis() {
        for policy in EvictionPolicy::ALL {
            let text = format!("[memory]\npolicy = \"{}\"", policy);
            assert_eq!(EngineConfig::from_toml_str(&text).unwrap().memory.policy, policy);
        }
    }

    #[test]
    fn test_validation_failures() {
        assert!(EngineConfig::from_toml_str("hz = 0").is_err());
        assert!(EngineConfig::from_toml_str("[expiry]\nthreshold = 1.5").is_err());
        assert!(EngineConfig::from_toml_str("[keyspace]\nresize_force_ratio = 0.5").is_err());
        assert!(EngineConfig::from_toml_str("[memory]\npolicy = \"lru\"").is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = EngineConfig::default();
        config.memory.policy = EvictionPolicy::VolatileTtl;
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
