//! Configuration options for table building.

use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;
use crate::statistics::Statistics;
use std::sync::Arc;

/// Configuration for a [`TableBuilder`](crate::sstable::TableBuilder).
///
/// All configuration flows through this bundle; there is no global state.
#[derive(Clone)]
pub struct Options {
    /// Total order over keys; also used to shorten index separators.
    /// Default: [`BytewiseComparator`].
    pub comparator: Arc<dyn Comparator>,

    /// Target uncompressed size per data block, in bytes.
    /// Default: 4KB
    pub block_size: usize,

    /// Percent (0-100). When non-zero, a block is flushed early if adding
    /// the next entry would overflow `block_size` while the block is
    /// already within this percentage of it. Zero disables early flushes.
    /// Default: 10
    pub block_size_deviation: u32,

    /// Number of entries between restart points in data blocks.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Default compression codec for blocks.
    /// Default: CompressionType::Snappy
    pub compression: CompressionType,

    /// Codec-specific parameters; opaque to the table builder.
    pub compression_opts: CompressionOptions,

    /// Optional codec per level. When non-empty it overrides `compression`:
    /// a builder for level `l` uses slot `clamp(l, 0, len - 1)`, so negative
    /// levels read the first slot and levels at or past the end read the
    /// last slot.
    pub compression_per_level: Vec<CompressionType>,

    /// Optional filter policy; when set, every table gets a filter
    /// meta-block named after the policy.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Optional timing counters for raw-block appends.
    pub statistics: Option<Arc<Statistics>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            block_size: 4 * 1024,
            block_size_deviation: 10,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            compression_opts: CompressionOptions::default(),
            compression_per_level: Vec::new(),
            filter_policy: None,
            statistics: None,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the comparator.
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Sets the target block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the block size deviation percentage.
    pub fn block_size_deviation(mut self, percent: u32) -> Self {
        self.block_size_deviation = percent;
        self
    }

    /// Sets the restart interval for data blocks.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the default compression codec.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the per-level compression codecs.
    pub fn compression_per_level(mut self, codecs: Vec<CompressionType>) -> Self {
        self.compression_per_level = codecs;
        self
    }

    /// Sets the filter policy.
    pub fn filter_policy(mut self, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filter_policy = Some(policy);
        self
    }

    /// Sets the statistics sink.
    pub fn statistics(mut self, statistics: Arc<Statistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_restart_interval == 0 {
            return Err(crate::Error::invalid_argument("block_restart_interval must be > 0"));
        }
        if self.block_size_deviation > 100 {
            return Err(crate::Error::invalid_argument(
                "block_size_deviation must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Compression codecs recognized by the block format.
///
/// The numeric values are written into block trailers, so they are fixed by
/// the file format regardless of which codec features this build carries.
/// Writing with a codec whose feature is disabled falls back to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate ratio).
    Snappy = 1,

    /// Zlib/deflate compression (slower, better ratio).
    Zlib = 2,

    /// Bzip2 compression (slowest, best ratio).
    Bzip2 = 3,
}

impl CompressionType {
    /// Convert from the trailer byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Zlib),
            3 => Some(CompressionType::Bzip2),
            _ => None,
        }
    }
}

/// Codec-specific tuning parameters, passed through to the compressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Compression level for codecs that support one (zlib 0-9, bzip2 1-9).
    pub level: u32,

    /// Window size hint; currently only meaningful to zlib-style codecs.
    pub window_bits: u32,

    /// Codec strategy selector; opaque.
    pub strategy: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { level: 6, window_bits: 15, strategy: 0 }
    }
}
