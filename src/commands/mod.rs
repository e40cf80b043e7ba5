//! Command Processing
//!
//! Turns a [`Command`] into a [`Reply`] by running it against a
//! [`Store`](crate::storage::Store).
//!
//! ## Architecture
//!
//! ```text
//! Command (name + args)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  lookup in COMMAND_TABLE, arity check,
//! │                 │  on_write notification
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    handlers     │  string / keys / list / server
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `GET`, `SET`, `SETNX`, `SETEX`, `PSETEX`
//! - `GETSET`, `GETDEL`, `MGET`, `MSET`
//! - `APPEND`, `STRLEN`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`
//!
//! ### Key Commands
//! - `DEL`, `EXISTS`, `TYPE`, `KEYS`, `SCAN`
//! - `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`
//! - `TTL`, `PTTL`, `PERSIST`
//! - `RENAME`, `RENAMENX`, `OBJECT`
//!
//! ### List Commands
//! - `LPUSH`, `RPUSH`, `LPOP`, `RPOP`
//! - `LLEN`, `LINDEX`, `LRANGE`
//!
//! ### Server Commands
//! - `PING`, `ECHO`, `TIME`, `INFO`
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//! - `DEBUG HTSTATS`

pub mod command;
pub mod handler;
mod keys;
mod list;
pub mod reply;
mod server;
mod string;
pub mod table;

pub use command::Command;
pub use handler::{Dispatcher, WriteHook};
pub use reply::Reply;
pub use table::{CommandFlags, CommandSpec, DispatchStats, COMMAND_TABLE};
