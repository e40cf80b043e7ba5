//! Storage Module
//!
//! Everything the engine keeps in memory for one logical database.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Store                             │
//! │                                                              │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌─────────────┐ │
//! │  │ Dict<Entry>      │  │ ExpiryManager    │  │ Memory      │ │
//! │  │ key → value +    │  │ Dict<u64>        │  │ Budget      │ │
//! │  │ access metadata  │  │ key → deadline   │  │ used / max  │ │
//! │  └──────────────────┘  └──────────────────┘  └─────────────┘ │
//! │            ▲                                       ▲         │
//! │            └──────────── EvictionManager ──────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Incremental Rehashing**: tables grow a few buckets at a time
//! - **Lazy Expiry**: expired keys are deleted when touched
//! - **Active Expiry**: a bounded random sweep runs every event loop tick
//! - **Eviction**: sampled LRU, LFU, random and shortest-TTL policies
//!
//! ## Example
//!
//! ```
//! use flashkv_core::storage::{Store, Value};
//! use bytes::Bytes;
//!
//! let mut store = Store::default();
//! store.set(Bytes::from("name"), Value::from("Ariz"), None).unwrap();
//! assert_eq!(store.get(b"name"), Some(&Value::from("Ariz")));
//! ```

pub mod dict;
pub mod eviction;
pub mod expiry;
pub mod glob;
pub mod memory;
pub mod store;
pub mod value;

pub use dict::{Dict, DictStats, KeyspaceConfig};
pub use eviction::{AccessMeta, EvictionConfig, EvictionManager, EvictionPolicy};
pub use expiry::{now_ms, ExpiryConfig, ExpiryManager, SweepReport};
pub use glob::GlobPattern;
pub use memory::MemoryBudget;
pub use store::{SnapshotEntry, Store, StoreStats, TtlResult};
pub use value::{Entry, Value};
