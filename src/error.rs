//! Error Types
//!
//! Errors are local to the thing that failed: a malformed command, a single
//! rejected command, or a write refused for lack of memory. None of them
//! unwind across commands or stop the event loop.
//!
//! Internal invariant violations (a corrupted hash table, a size mismatch
//! after rehashing) are not represented here. They go through
//! [`invariant_violation`], which logs and panics.

use thiserror::Error;
use tracing::error;

/// Malformed command handed over by the protocol layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,

    #[error("invalid command name")]
    InvalidName,

    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,
}

/// A write was refused because eviction could not free enough memory.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("OOM command not allowed when used memory > 'maxmemory'")]
pub struct OutOfMemory;

/// Per-command failure, returned inline as that command's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    Unknown(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR unknown subcommand '{0}'")]
    UnknownSubcommand(String),

    #[error("ERR {0} is not tracked under the current maxmemory policy")]
    NotTracked(&'static str),

    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// Result alias for command handlers.
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Reports a broken internal invariant and aborts the current operation.
///
/// The release profile builds with `panic = "abort"`, so this takes the
/// whole process down.
#[cold]
#[track_caller]
pub(crate) fn invariant_violation(what: &str) -> ! {
    error!(invariant = what, "internal invariant violated");
    panic!("internal invariant violated: {what}");
}
