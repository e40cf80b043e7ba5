//! # FlashKV Core - A Single-Threaded In-Memory Key-Value Engine
//!
//! The engine core of a Redis-style database: an event loop, a command
//! dispatcher and a keyspace store with expiry and memory-bounded eviction.
//! Wire protocols, persistence and replication live outside this crate and
//! plug in through [`Command`], [`Engine::on_write`] and
//! [`Store::snapshot_iter`](storage::Store::snapshot_iter).
//!
//! ## Features
//!
//! - **Incremental Rehashing**: the keyspace table grows a few buckets at a
//!   time, so no single command pays for a full resize
//! - **TTL Support**: lazy expiry on access plus a sampled, time-boxed
//!   active sweep
//! - **Eviction**: approximate LRU / LFU / random / shortest-TTL under a
//!   configurable memory ceiling
//! - **Event Loop**: `mio` readiness, timers and cross-thread mailboxes on
//!   one thread, no locks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               EventLoop                                 │
//! │   fd callbacks    timers (cron @ hz)    mailboxes    housekeeping       │
//! └────────┬──────────────────┬──────────────────────────────┬──────────────┘
//!          │                  │                              │
//!          ▼                  ▼                              ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                Engine                                   │
//! │                                                                         │
//! │  ┌─────────────┐   on_write    ┌──────────────────────────────────────┐ │
//! │  │ Dispatcher  │──────────────>│ persistence / replication (external) │ │
//! │  └──────┬──────┘               └──────────────────────────────────────┘ │
//! │         ▼                                                               │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                             Store                                 │  │
//! │  │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────────────┐ │  │
//! │  │  │ Dict<Entry>  │  │ ExpiryManager │  │ EvictionManager + Budget│ │  │
//! │  │  └──────────────┘  └───────────────┘  └─────────────────────────┘ │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashkv_core::commands::{Command, Reply};
//! use flashkv_core::Engine;
//!
//! let mut engine = Engine::default();
//! engine.on_write(|db, command| println!("db{} <- {}", db, command));
//!
//! let set = Command::parse_inline("SET greeting hello").unwrap();
//! assert_eq!(engine.execute(&set), Ok(Reply::ok()));
//!
//! let get = Command::parse_inline("GET greeting").unwrap();
//! assert_eq!(engine.execute(&get).unwrap().as_bytes(), Some(&b"hello"[..]));
//! ```
//!
//! ## Module Overview
//!
//! - [`event_loop`]: readiness, timers, mailboxes and the housekeeping hook
//! - [`commands`]: command table, dispatcher and handlers
//! - [`storage`]: store, incremental dict, expiry, eviction, memory budget
//! - [`config`]: TOML configuration
//! - [`error`]: error types

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, Dispatcher, Reply};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CommandError, OutOfMemory, ProtocolError};
pub use event_loop::{EventId, EventLoop, Housekeeping, Interest, Mailbox, Readiness};
pub use storage::{EvictionPolicy, Store, Value};

/// Version of FlashKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
