//! SSTable (Sorted String Table) implementation.
//!
//! An SSTable is an immutable, sorted file of key-value pairs built once
//! and read many times.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Filter Block]     // optional, named "filter.<policy>"
//! [Stats Block]      // "rocksdb.stats"
//! [Meta Index Block] // meta-block name -> handle
//! [Index Block]      // separator key -> data block handle
//! [Footer: 48B]      // handles of meta-index and index + magic
//! ```
//!
//! Every block on disk is followed by a 5-byte trailer: one codec type
//! byte and a fixed32 masked CRC32C covering the block bytes plus the
//! type byte.

pub mod block;
pub mod builder;
pub mod compress;
pub mod filter_block;
pub mod footer;
pub mod reader;
pub mod sink;

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::TableBuilder;
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use footer::{BlockHandle, Footer};
pub use reader::TableReader;
pub use sink::{FileSink, TableSink};

// Re-export the codec enum; the trailer type byte is its wire value.
pub use crate::config::CompressionType;

/// Size of the per-block trailer: 1 type byte + 4 CRC bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 48;

/// Maximum encoded length of a [`BlockHandle`]; handles stored in the
/// footer are zero-padded to this length.
pub const MAX_ENCODED_HANDLE_LENGTH: usize = 20;

/// Magic number terminating every complete table file (little-endian).
pub const TABLE_MAGIC_NUMBER: u64 = 0xdb4775248b80fb57;

/// Every filter covers `1 << FILTER_BASE_LG` bytes of data-block space.
pub const FILTER_BASE_LG: u32 = 11;

/// Meta-index key prefix for filter blocks; the policy name is appended.
pub const FILTER_BLOCK_PREFIX: &str = "filter.";

/// Meta-index key of the stats block.
pub const STATS_BLOCK_KEY: &str = "rocksdb.stats";

/// Stable key strings of the stats block.
pub mod stats_names {
    /// Sum of key bytes added.
    pub const RAW_KEY_SIZE: &str = "rocksdb.raw.key.size";
    /// Sum of value bytes added.
    pub const RAW_VALUE_SIZE: &str = "rocksdb.raw.value.size";
    /// Offset reached at the end of the last data block.
    pub const DATA_SIZE: &str = "rocksdb.data.size";
    /// Index-block size estimate including its trailer.
    pub const INDEX_SIZE: &str = "rocksdb.index.size";
    /// Total entries added.
    pub const NUM_ENTRIES: &str = "rocksdb.num.entries";
    /// Data-block count.
    pub const NUM_DATA_BLOCKS: &str = "rocksdb.num.data.blocks";
}
