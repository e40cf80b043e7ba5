//! Stored Values
//!
//! A value is a plain Rust enum. String values pick the most compact
//! encoding on construction:
//!
//! | Input                        | Encoding            |
//! |------------------------------|---------------------|
//! | canonical 64-bit integer     | `Value::Int`        |
//! | up to 30 bytes               | `Value::Short` (inline, no heap) |
//! | anything longer              | `Value::Long` (shared `Bytes`)   |
//!
//! Lists are the one composite type and are stored as a `VecDeque`.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;

use crate::error::CommandError;
use crate::storage::eviction::AccessMeta;

/// Longest string stored inline.
pub const SHORT_STR_MAX: usize = 30;

/// Longest textual form of an `i64` ("-9223372036854775808").
const MAX_INT_TEXT_LEN: usize = 20;

/// Small string stored inline in the value itself.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShortStr {
    len: u8,
    buf: [u8; SHORT_STR_MAX],
}

impl ShortStr {
    /// Returns `None` when `data` does not fit inline.
    pub fn new(data: &[u8]) -> Option<Self> {
        if data.len() > SHORT_STR_MAX {
            return None;
        }
        let mut buf = [0u8; SHORT_STR_MAX];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            len: data.len() as u8,
            buf,
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

impl fmt::Debug for ShortStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// A value held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// String holding a canonical integer.
    Int(i64),
    /// Short string stored inline.
    Short(ShortStr),
    /// Longer string backed by a shared buffer.
    Long(Bytes),
    /// List of byte strings.
    List(VecDeque<Bytes>),
}

impl Value {
    /// Builds a string value, choosing the most compact encoding.
    pub fn string(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if let Some(n) = parse_canonical_int(&data) {
            return Value::Int(n);
        }
        match ShortStr::new(&data) {
            Some(short) => Value::Short(short),
            None => Value::Long(data),
        }
    }

    pub fn from_int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn list(items: impl IntoIterator<Item = Bytes>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Short(_) | Value::Long(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// Name reported by OBJECT ENCODING.
    pub fn encoding(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Short(_) => "embstr",
            Value::Long(_) => "raw",
            Value::List(_) => "linkedlist",
        }
    }

    pub fn is_string(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    /// Returns the string contents, or `None` for non-string values.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Value::Int(n) => Some(Bytes::from(n.to_string())),
            Value::Short(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            Value::Long(b) => Some(b.clone()),
            Value::List(_) => None,
        }
    }

    /// Like [`Value::to_bytes`] but fails with `WrongType` on lists.
    pub fn string_bytes(&self) -> Result<Bytes, CommandError> {
        self.to_bytes().ok_or(CommandError::WrongType)
    }

    /// Length of the string contents.
    pub fn string_len(&self) -> Result<usize, CommandError> {
        match self {
            Value::Int(n) => Ok(n.to_string().len()),
            Value::Short(s) => Ok(s.as_bytes().len()),
            Value::Long(b) => Ok(b.len()),
            Value::List(_) => Err(CommandError::WrongType),
        }
    }

    /// Interprets the value as an integer (INCR and friends).
    pub fn as_int(&self) -> Result<i64, CommandError> {
        let parse = |data: &[u8]| parse_canonical_int(data).ok_or(CommandError::NotInteger);
        match self {
            Value::Int(n) => Ok(*n),
            Value::Short(s) => parse(s.as_bytes()),
            Value::Long(b) => parse(b),
            Value::List(_) => Err(CommandError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, CommandError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, CommandError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(CommandError::WrongType),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::string(b)
    }
}

/// Parses `data` only if it is the exact decimal form of an `i64`.
///
/// "10" becomes `Int`, while "010", "+10" and "-0" stay strings so that
/// reading the value back returns the original bytes. Integer arguments
/// and INCR operands follow the same rule.
pub(crate) fn parse_canonical_int(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data.len() > MAX_INT_TEXT_LEN {
        return None;
    }
    let n: i64 = std::str::from_utf8(data).ok()?.parse().ok()?;
    (n.to_string().as_bytes() == data).then_some(n)
}

/// A value plus its access metadata, as stored in a bucket.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) value: Value,
    pub(crate) access: AccessMeta,
}

impl Entry {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn access(&self) -> AccessMeta {
        self.access
    }
}
