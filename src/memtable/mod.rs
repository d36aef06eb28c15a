//! # MemTable - In-Memory Sorted Table
//!
//! The memtable is the in-memory structure that write batches are applied
//! to. It is the insertion target for
//! [`WriteBatch::insert_into`](crate::WriteBatch::insert_into) and the
//! source a table builder is later fed from, in internal-key order.
//!
//! Based on crossbeam-skiplist for lock-free concurrent access.

mod internal_key;

pub use internal_key::{InternalKey, ValueType};

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// MemTable stores recent writes in memory using a SkipList.
///
/// Entries are keyed by [`InternalKey`] (user key ascending, sequence
/// descending), so every version of a key is retained and a full scan
/// yields comparator order.
///
/// # Example
///
/// ```rust
/// use tablekv::memtable::MemTable;
///
/// let memtable = MemTable::new();
/// memtable.put(b"key1", b"value1", 1);
/// memtable.delete(b"key1", 2);
/// assert_eq!(memtable.len(), 2);
/// ```
pub struct MemTable {
    /// The underlying SkipList storing InternalKey -> Value
    data: Arc<SkipMap<InternalKey, Vec<u8>>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Creates a new empty MemTable.
    pub fn new() -> Self {
        Self { data: Arc::new(SkipMap::new()), size: AtomicUsize::new(0) }
    }

    /// Inserts a key-value pair with the given sequence number.
    pub fn put(&self, key: &[u8], value: &[u8], sequence: u64) {
        self.insert(key, value, sequence, ValueType::Value);
    }

    /// Inserts a merge operand with the given sequence number.
    pub fn merge(&self, key: &[u8], value: &[u8], sequence: u64) {
        self.insert(key, value, sequence, ValueType::Merge);
    }

    /// Inserts a deletion tombstone with the given sequence number.
    pub fn delete(&self, key: &[u8], sequence: u64) {
        self.insert(key, &[], sequence, ValueType::Deletion);
    }

    fn insert(&self, key: &[u8], value: &[u8], sequence: u64, value_type: ValueType) {
        let internal_key = InternalKey::new(key.to_vec(), sequence, value_type);
        let entry_size = internal_key.encoded_size() + value.len();

        self.data.insert(internal_key, value.to_vec());
        self.size.fetch_add(entry_size, Ordering::Relaxed);
    }

    /// Returns the approximate size of the MemTable in bytes.
    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns the number of entries in the MemTable.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an iterator over entries in internal-key order.
    pub fn iter(&self) -> MemTableIterator {
        MemTableIterator::new(self.data.clone())
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries in sorted order.
pub struct MemTableIterator {
    _data: Arc<SkipMap<InternalKey, Vec<u8>>>,
    iter: crossbeam_skiplist::map::Iter<'static, InternalKey, Vec<u8>>,
}

impl MemTableIterator {
    fn new(data: Arc<SkipMap<InternalKey, Vec<u8>>>) -> Self {
        // SAFETY: the Arc keeps the SkipMap alive for the lifetime of the
        // iterator, so extending the borrow to 'static is sound as long as
        // `_data` is held alongside it.
        let iter = unsafe {
            std::mem::transmute::<
                crossbeam_skiplist::map::Iter<'_, InternalKey, Vec<u8>>,
                crossbeam_skiplist::map::Iter<'static, InternalKey, Vec<u8>>,
            >(data.iter())
        };

        Self { _data: data, iter }
    }
}

impl Iterator for MemTableIterator {
    type Item = MemTableEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter
            .next()
            .map(|entry| MemTableEntry { key: entry.key().clone(), value: entry.value().clone() })
    }
}

/// A single entry in the MemTable.
#[derive(Debug, Clone)]
pub struct MemTableEntry {
    key: InternalKey,
    value: Vec<u8>,
}

impl MemTableEntry {
    /// Returns the value of this entry.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns the user key (without sequence number and type).
    pub fn user_key(&self) -> &[u8] {
        self.key.user_key()
    }

    /// Returns the sequence number of this entry.
    pub fn sequence(&self) -> u64 {
        self.key.sequence()
    }

    /// Returns the value type.
    pub fn value_type(&self) -> ValueType {
        self.key.value_type()
    }
}
