//! Memory Accounting
//!
//! Byte-level estimate of what the keyspace holds, updated on every entry
//! creation, mutation and removal so the eviction path never has to scan.
//! The numbers are estimates: they drive eviction and INFO, not allocation.

use crate::storage::value::Value;

/// Fixed per-entry cost: slot (hash + key handle), value enum, access
/// metadata and bucket bookkeeping.
pub const ENTRY_OVERHEAD: usize = 96;

/// Per-element cost of a list node on top of its bytes.
pub const LIST_ELEMENT_OVERHEAD: usize = 32;

/// Cost of an empty list.
pub const LIST_BASE_OVERHEAD: usize = 24;

/// Estimated footprint of one stored entry.
pub fn entry_size(key: &[u8], value: &Value) -> usize {
    key.len() + value_size(value) + ENTRY_OVERHEAD
}

/// Payload bytes of a value. Inline encodings count as zero.
pub fn value_size(value: &Value) -> usize {
    match value {
        Value::Int(_) | Value::Short(_) => 0,
        Value::Long(data) => data.len(),
        Value::List(items) => {
            LIST_BASE_OVERHEAD
                + items
                    .iter()
                    .map(|item| item.len() + LIST_ELEMENT_OVERHEAD)
                    .sum::<usize>()
        }
    }
}

/// Extra bytes a list grows by when `items` are pushed onto it.
pub fn list_push_size<'a>(items: impl IntoIterator<Item = &'a [u8]>) -> usize {
    items
        .into_iter()
        .map(|item| item.len() + LIST_ELEMENT_OVERHEAD)
        .sum()
}

/// Configured ceiling plus current estimated usage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBudget {
    max_bytes: usize,
    used: usize,
}

impl MemoryBudget {
    /// `max_bytes == 0` means unlimited.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_limited(&self) -> bool {
        self.max_bytes != 0
    }

    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    /// Whether reserving `incoming` more bytes would break the ceiling.
    pub fn would_exceed(&self, incoming: usize) -> bool {
        self.is_limited() && self.used.saturating_add(incoming) > self.max_bytes
    }

    pub fn charge(&mut self, size: usize) {
        self.used = self.used.saturating_add(size);
    }

    pub fn release(&mut self, size: usize) {
        self.used = self.used.saturating_sub(size);
    }

    /// Replaces an entry's old size with its new size.
    pub fn adjust(&mut self, old_size: usize, new_size: usize) {
        self.used = self.used.saturating_sub(old_size).saturating_add(new_size);
    }

    /// Used by FLUSHDB.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_entry_size_components() {
        assert_eq!(entry_size(b"key", &Value::from("12")), 3 + ENTRY_OVERHEAD);
        let long = Value::from("z".repeat(64).as_str());
        assert_eq!(entry_size(b"k", &long), 1 + 64 + ENTRY_OVERHEAD);

        let list = Value::list(vec![Bytes::from("ab"), Bytes::from("c")]);
        assert_eq!(
            value_size(&list),
            LIST_BASE_OVERHEAD + 3 + 2 * LIST_ELEMENT_OVERHEAD
        );
        assert_eq!(
            list_push_size([&b"ab"[..], &b"c"[..]]),
            3 + 2 * LIST_ELEMENT_OVERHEAD
        );
    }

    #[test]
    fn test_unlimited_never_exceeds() {
        let mut budget = MemoryBudget::new(0);
        budget.charge(usize::MAX / 2);
        assert!(!budget.would_exceed(usize::MAX / 2));
    }

    #[test]
    fn test_charge_release_adjust() {
        let mut budget = MemoryBudget::new(1000);
        budget.charge(600);
        assert!(!budget.would_exceed(400));
        assert!(budget.would_exceed(401));

        budget.adjust(600, 100);
        assert_eq!(budget.used(), 100);

        budget.release(500);
        assert_eq!(budget.used(), 0);

        budget.charge(10);
        budget.reset();
        assert_eq!(budget.used(), 0);
    }
}
