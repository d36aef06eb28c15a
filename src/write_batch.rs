//! WriteBatch groups write operations for atomic application.
//!
//! A batch holds its operations pre-serialized: the same bytes are shipped
//! to the write-ahead log and replayed into the memtable, so there is one
//! marshaling discipline for both.
//!
//! ## Layout
//!
//! ```text
//! [sequence: fixed64]
//! [count: fixed32]        // number of non-LogData records
//! [record]*
//!
//! record :=
//!   0 (Delete)   [key: length-prefixed]
//! | 1 (Value)    [key: length-prefixed] [value: length-prefixed]
//! | 2 (Merge)    [key: length-prefixed] [value: length-prefixed]
//! | 3 (LogData)  [blob: length-prefixed]
//! ```
//!
//! LogData records travel with the batch and are visible to
//! [`iterate`](WriteBatch::iterate) handlers, but are never inserted into
//! the memtable and consume no sequence number.
//!
//! # Example
//!
//! ```rust
//! use tablekv::{MemTable, WriteBatch};
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"key1", b"value1");
//! batch.delete(b"key2");
//! batch.set_sequence(100);
//!
//! let memtable = MemTable::new();
//! batch.insert_into(&memtable).unwrap();
//! assert_eq!(memtable.len(), 2);
//! ```

use crate::coding::{get_length_prefixed, put_length_prefixed};
use crate::error::{Error, Result};
use crate::memtable::MemTable;

/// Size of the sequence + count header.
pub const BATCH_HEADER_SIZE: usize = 12;

const TYPE_DELETION: u8 = 0;
const TYPE_VALUE: u8 = 1;
const TYPE_MERGE: u8 = 2;
const TYPE_LOG_DATA: u8 = 3;

/// Receiver for [`WriteBatch::iterate`]; called once per record in
/// insertion order.
pub trait Handler {
    /// A Put record.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// A Merge record.
    fn merge(&mut self, key: &[u8], value: &[u8]);

    /// A Delete record.
    fn delete(&mut self, key: &[u8]);

    /// A LogData record. Default: ignored.
    fn log_data(&mut self, _blob: &[u8]) {}
}

/// A serialized sequence of write operations.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    // Invariant: always at least BATCH_HEADER_SIZE bytes.
    data: Vec<u8>,
}

impl WriteBatch {
    /// Creates an empty batch (header only, count 0, sequence 0).
    pub fn new() -> Self {
        Self { data: vec![0; BATCH_HEADER_SIZE] }
    }

    /// Rebuilds a batch from serialized bytes, e.g. a log record.
    ///
    /// # Panics
    ///
    /// Panics if `data` is shorter than the 12-byte header.
    pub fn from_data(data: Vec<u8>) -> Self {
        assert!(data.len() >= BATCH_HEADER_SIZE, "batch shorter than its header");
        Self { data }
    }

    /// The serialized batch, ready to append to a log.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Appends a Put record.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.data.push(TYPE_VALUE);
        put_length_prefixed(&mut self.data, key);
        put_length_prefixed(&mut self.data, value);
        self.set_count(self.count() + 1);
    }

    /// Appends a Merge record.
    pub fn merge(&mut self, key: &[u8], value: &[u8]) {
        self.data.push(TYPE_MERGE);
        put_length_prefixed(&mut self.data, key);
        put_length_prefixed(&mut self.data, value);
        self.set_count(self.count() + 1);
    }

    /// Appends a Delete record.
    pub fn delete(&mut self, key: &[u8]) {
        self.data.push(TYPE_DELETION);
        put_length_prefixed(&mut self.data, key);
        self.set_count(self.count() + 1);
    }

    /// Appends a LogData record. The blob rides along in the log but is
    /// not counted and never reaches the memtable.
    pub fn put_log_data(&mut self, blob: &[u8]) {
        self.data.push(TYPE_LOG_DATA);
        put_length_prefixed(&mut self.data, blob);
    }

    /// Resets the batch to an empty header.
    pub fn clear(&mut self) {
        self.data.clear();
        self.data.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Number of non-LogData records.
    pub fn count(&self) -> u32 {
        u32::from_le_bytes(self.data[8..12].try_into().unwrap())
    }

    /// Overwrites the record count.
    pub fn set_count(&mut self, count: u32) {
        self.data[8..12].copy_from_slice(&count.to_le_bytes());
    }

    /// Sequence number assigned to the first record.
    pub fn sequence(&self) -> u64 {
        u64::from_le_bytes(self.data[..8].try_into().unwrap())
    }

    /// Overwrites the sequence number.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.data[..8].copy_from_slice(&sequence.to_le_bytes());
    }

    /// Concatenates `src`'s records onto `self`. The count grows by
    /// `src.count()` (LogData records are carried but stay uncounted);
    /// the sequence number is left unchanged.
    pub fn append(&mut self, src: &WriteBatch) {
        self.set_count(self.count() + src.count());
        self.data.extend_from_slice(&src.data[BATCH_HEADER_SIZE..]);
    }

    /// Decodes the records in insertion order, calling `handler` for each.
    ///
    /// Decoding is strict: a truncated record or unknown tag stops
    /// iteration with `Corruption`, after the records already decoded have
    /// been delivered.
    pub fn iterate(&self, handler: &mut dyn Handler) -> Result<()> {
        let mut input = &self.data[BATCH_HEADER_SIZE..];
        let mut found: u32 = 0;

        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            match tag {
                TYPE_VALUE => {
                    let (key, rest) = get_length_prefixed(input)
                        .map_err(|_| Error::corruption("bad WriteBatch Put"))?;
                    let (value, rest) = get_length_prefixed(rest)
                        .map_err(|_| Error::corruption("bad WriteBatch Put"))?;
                    input = rest;
                    handler.put(key, value);
                    found += 1;
                }
                TYPE_MERGE => {
                    let (key, rest) = get_length_prefixed(input)
                        .map_err(|_| Error::corruption("bad WriteBatch Merge"))?;
                    let (value, rest) = get_length_prefixed(rest)
                        .map_err(|_| Error::corruption("bad WriteBatch Merge"))?;
                    input = rest;
                    handler.merge(key, value);
                    found += 1;
                }
                TYPE_DELETION => {
                    let (key, rest) = get_length_prefixed(input)
                        .map_err(|_| Error::corruption("bad WriteBatch Delete"))?;
                    input = rest;
                    handler.delete(key);
                    found += 1;
                }
                TYPE_LOG_DATA => {
                    let (blob, rest) = get_length_prefixed(input)
                        .map_err(|_| Error::corruption("bad WriteBatch LogData"))?;
                    input = rest;
                    handler.log_data(blob);
                }
                _ => return Err(Error::corruption("unknown WriteBatch tag")),
            }
        }

        if found != self.count() {
            return Err(Error::corruption("WriteBatch has wrong count"));
        }
        Ok(())
    }

    /// Applies the batch to `memtable`, assigning sequence numbers
    /// consecutively from [`sequence`](Self::sequence). LogData records
    /// are skipped and consume no number.
    ///
    /// On a decode failure the memtable keeps the prefix that was already
    /// applied and the error is returned.
    pub fn insert_into(&self, memtable: &MemTable) -> Result<()> {
        let mut inserter = MemTableInserter { sequence: self.sequence(), memtable };
        self.iterate(&mut inserter)
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

struct MemTableInserter<'a> {
    sequence: u64,
    memtable: &'a MemTable,
}

impl Handler for MemTableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.memtable.put(key, value, self.sequence);
        self.sequence += 1;
    }

    fn merge(&mut self, key: &[u8], value: &[u8]) {
        self.memtable.merge(key, value, self.sequence);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.memtable.delete(key, self.sequence);
        self.sequence += 1;
    }
}
