//! Block format implementation for SSTable.
//!
//! A block holds sorted key-value entries with shared-prefix compression.
//! Restart points are offsets where a full key is materialized, bounding
//! how far back a reader must go to reconstruct any key.
//!
//! ## Format
//!
//! ```text
//! [Entry 1]
//! ...
//! [Entry N]
//! [Restart Offset 1: fixed32]
//! ...
//! [Restart Offset M: fixed32]
//! [Num Restarts: fixed32]
//! ```
//!
//! Each entry:
//! ```text
//! [shared: varint32]      // bytes shared with the previous key
//! [non_shared: varint32]  // bytes of key suffix stored here
//! [value_len: varint32]
//! [key_suffix: bytes]
//! [value: bytes]
//! ```
//!
//! The first entry of every restart group stores the full key
//! (`shared = 0`).

use crate::coding::{
    decode_fixed32, get_varint32, put_fixed32, put_varint32, varint32_length,
};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;

/// BlockBuilder assembles one block; reusable via [`reset`](Self::reset).
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
    restart_interval: usize,
    comparator: Arc<dyn Comparator>,
}

impl BlockBuilder {
    /// Create a new BlockBuilder.
    pub fn new(restart_interval: usize, comparator: Arc<dyn Comparator>) -> Self {
        assert!(restart_interval >= 1, "restart interval must be at least 1");
        Self {
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
            restart_interval,
            comparator,
        }
    }

    /// Add a key-value pair. Keys must arrive in strictly ascending order
    /// under the builder's comparator, and `add` must not be called after
    /// [`finish`](Self::finish) until the builder is reset.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add after finish");
        debug_assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == std::cmp::Ordering::Greater,
            "keys must be added in sorted order"
        );

        let mut shared = 0;
        if self.counter >= self.restart_interval {
            // Start a new restart group at this entry.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        } else {
            shared = shared_prefix_len(&self.last_key, key);
        }
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Bytes the block would occupy if finished now (uncompressed, without
    /// the on-disk trailer).
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Size estimate after a hypothetical `add(key, value)`.
    pub fn estimate_size_after(&self, key: &[u8], value: &[u8]) -> usize {
        let mut estimate = self.current_size_estimate();
        estimate += key.len() + value.len();
        if self.counter >= self.restart_interval {
            estimate += 4; // new restart offset
        }
        estimate += 1; // varint of the shared length
        estimate += varint32_length(key.len() as u32);
        estimate += varint32_length(value.len() as u32);
        estimate
    }

    /// Append the restart array and return the completed block bytes.
    /// The slice is valid until the next mutation of this builder.
    pub fn finish(&mut self) -> &[u8] {
        for i in 0..self.restarts.len() {
            let restart = self.restarts[i];
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Clears all state back to construction defaults.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// True iff no entries were added since construction or the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Changes the restart interval. Only legal between blocks, i.e. while
    /// the builder is empty.
    pub(crate) fn reset_interval(&mut self, restart_interval: usize) {
        debug_assert!(self.is_empty(), "restart interval change mid-block");
        assert!(restart_interval >= 1);
        self.restart_interval = restart_interval;
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let min_len = a.len().min(b.len());
    let mut i = 0;
    while i < min_len && a[i] == b[i] {
        i += 1;
    }
    i
}

/// An immutable, parsed block.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Parses the restart array of a finished block.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too small"));
        }

        let num_restarts = decode_fixed32(&data[data.len() - 4..])?;
        let restart_array_len = num_restarts as usize * 4 + 4;
        if num_restarts == 0 || restart_array_len > data.len() {
            return Err(Error::corruption("bad restart array"));
        }
        let restart_offset = data.len() - restart_array_len;

        Ok(Self { data, restart_offset, num_restarts })
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Creates an iterator over the block.
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.clone())
    }

    /// Raw block bytes, including the restart array.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Iterator over entries in a block.
pub struct BlockIterator {
    block: Block,
    current: usize,
    key: Vec<u8>,
    value_range: (usize, usize),
    valid: bool,
}

impl BlockIterator {
    fn new(block: Block) -> Self {
        Self { block, current: 0, key: Vec::new(), value_range: (0, 0), valid: false }
    }

    /// Position before the first entry; call [`advance`](Self::advance) to
    /// land on it.
    pub fn seek_to_first(&mut self) {
        self.current = 0;
        self.key.clear();
        self.valid = false;
    }

    /// Step to the next entry. Returns false at the end of the block or on
    /// a malformed entry.
    pub fn advance(&mut self) -> bool {
        if self.current >= self.block.restart_offset {
            self.valid = false;
            return false;
        }
        match self.parse_entry() {
            Ok(()) => {
                self.valid = true;
                true
            }
            Err(e) => {
                log::warn!("malformed block entry at offset {}: {}", self.current, e);
                self.valid = false;
                false
            }
        }
    }

    fn parse_entry(&mut self) -> Result<()> {
        let limit = self.block.restart_offset;
        let entry = &self.block.data[self.current..limit];

        let (shared, rest) = get_varint32(entry)?;
        let (non_shared, rest) = get_varint32(rest)?;
        let (value_len, rest) = get_varint32(rest)?;
        let (shared, non_shared, value_len) =
            (shared as usize, non_shared as usize, value_len as usize);

        if shared > self.key.len() || rest.len() < non_shared + value_len {
            return Err(Error::corruption("block entry overruns restart area"));
        }

        let header_len = entry.len() - rest.len();
        let suffix_start = self.current + header_len;

        self.key.truncate(shared);
        self.key.extend_from_slice(&self.block.data[suffix_start..suffix_start + non_shared]);
        self.value_range = (suffix_start + non_shared, suffix_start + non_shared + value_len);
        self.current = self.value_range.1;
        Ok(())
    }

    /// True while positioned on an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Current key.
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "iterator not valid");
        &self.key
    }

    /// Current value.
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "iterator not valid");
        &self.block.data[self.value_range.0..self.value_range.1]
    }
}
