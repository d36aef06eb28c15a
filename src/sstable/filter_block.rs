//! Filter meta-block construction and lookup.
//!
//! One filter is generated per `1 << FILTER_BASE_LG` bytes of data-block
//! space: a data block starting at file offset `o` is covered by filter
//! index `o >> FILTER_BASE_LG`. The block layout is:
//!
//! ```text
//! [filter 0]
//! [filter 1]
//! ...
//! [offset of filter 0: fixed32]
//! [offset of filter 1: fixed32]
//! ...
//! [offset of offset array: fixed32]
//! [base_lg: u8]
//! ```

use crate::coding::{decode_fixed32, put_fixed32};
use crate::filter::FilterPolicy;
use crate::sstable::FILTER_BASE_LG;
use std::sync::Arc;

/// Accumulates keys per data-block range and emits the filter meta-block.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    // Keys of the current range, flattened, with their start offsets.
    keys: Vec<u8>,
    starts: Vec<usize>,
    // Generated filters so far, with their start offsets.
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Create a builder for the given policy.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
            starts: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Called by the table builder at every data-block boundary with the
    /// file offset the next block will start at. Emits filters for every
    /// range that ends before that offset.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset >> FILTER_BASE_LG) as usize;
        debug_assert!(filter_index >= self.filter_offsets.len());
        while self.filter_offsets.len() < filter_index {
            self.generate_filter();
        }
    }

    /// Stages a key for the current range.
    pub fn add_key(&mut self, key: &[u8]) {
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Flushes the pending range and returns the complete meta-block.
    pub fn finish(mut self) -> Vec<u8> {
        if !self.starts.is_empty() {
            self.generate_filter();
        }

        let offset_array_start = self.result.len() as u32;
        for i in 0..self.filter_offsets.len() {
            let offset = self.filter_offsets[i];
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, offset_array_start);
        self.result.push(FILTER_BASE_LG as u8);
        self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.starts.is_empty() {
            // No keys landed in this range; its filter is empty.
            return;
        }

        self.starts.push(self.keys.len()); // sentinel for the last key
        let keys: Vec<&[u8]> = self
            .starts
            .windows(2)
            .map(|pair| &self.keys[pair[0]..pair[1]])
            .collect();
        let filter = self.policy.create_filter(&keys);
        self.result.extend_from_slice(&filter);

        self.keys.clear();
        self.starts.clear();
    }
}

/// Parses a filter meta-block and answers membership queries for blocks.
pub struct FilterBlockReader<'a> {
    policy: Arc<dyn FilterPolicy>,
    data: &'a [u8],
    offset_array_start: usize,
    num_filters: usize,
    base_lg: u32,
}

impl<'a> FilterBlockReader<'a> {
    /// Parse `contents` as a filter meta-block. Returns `None` when the
    /// block is structurally invalid; lookups then fall back to "may
    /// match" at the call site.
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: &'a [u8]) -> Option<Self> {
        if contents.len() < 5 {
            return None;
        }
        let base_lg = contents[contents.len() - 1] as u32;
        let offset_array_start =
            decode_fixed32(&contents[contents.len() - 5..]).ok()? as usize;
        if offset_array_start > contents.len() - 5 {
            return None;
        }
        let num_filters = (contents.len() - 5 - offset_array_start) / 4;
        Some(Self { policy, data: contents, offset_array_start, num_filters, base_lg })
    }

    /// True if `key` may appear in the data block starting at
    /// `block_offset`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            return true; // out of range: treat as a potential match
        }

        let pos = self.offset_array_start + index * 4;
        let start = match decode_fixed32(&self.data[pos..]) {
            Ok(v) => v as usize,
            Err(_) => return true,
        };
        let limit = if index + 1 < self.num_filters {
            match decode_fixed32(&self.data[pos + 4..]) {
                Ok(v) => v as usize,
                Err(_) => return true,
            }
        } else {
            self.offset_array_start
        };

        if start == limit {
            // Empty filter: no keys landed in this range.
            return false;
        }
        if start > limit || limit > self.offset_array_start {
            return true;
        }
        self.policy.key_may_match(key, &self.data[start..limit])
    }
}
