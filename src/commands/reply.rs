//! Command Replies
//!
//! Typed results returned by the dispatcher. Turning a [`Reply`] into
//! bytes on the wire is the protocol layer's job; the `Display` impl renders
//! it the way `redis-cli` does, which is what the bundled front-end prints.

use bytes::Bytes;
use std::fmt;

/// Result of a successfully executed command.
///
/// Errors are not a variant: they travel as `Err(CommandError)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Short status line such as `OK` or `PONG`.
    Status(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string.
    Bulk(Bytes),

    /// Missing value.
    Nil,

    /// Ordered list of replies, possibly nested.
    Array(Vec<Reply>),
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    pub fn array(values: Vec<Reply>) -> Self {
        Reply::Array(values)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// `1` / `0` integer reply.
    pub fn from_bool(b: bool) -> Self {
        Reply::Integer(b as i64)
    }

    /// Bulk reply for `Some`, nil for `None`.
    pub fn bulk_or_nil(data: Option<Bytes>) -> Self {
        data.map_or(Reply::Nil, Reply::Bulk)
    }

    pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Self {
        Reply::Array(items.into_iter().map(Reply::Bulk).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(b) => Some(b),
            _ => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{:?}", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            Reply::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                        write!(f, "{:width$}", "", width = depth * 3)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    v.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
