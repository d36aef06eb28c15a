//! # tablekv - Sorted-Table Writer for an LSM-Tree Storage Engine
//!
//! tablekv implements the persistence primitives at the heart of an
//! LSM-tree engine: the immutable sorted-table (SSTable) builder that
//! defines the on-disk binary contract, and the write batch whose
//! serialized form feeds both the write-ahead log and the memtable.
//!
//! ## Components
//!
//! - **TableBuilder**: streams strictly ascending key-value pairs into a
//!   file of checksummed, optionally compressed blocks, then emits the
//!   filter, stats, meta-index, and index meta-blocks plus a fixed footer
//! - **TableReader**: verifies and reads those files back
//! - **WriteBatch**: a tagged record buffer with atomic apply into a
//!   memtable
//! - **MemTable**: skiplist-backed sorted map keyed by (user key,
//!   sequence, type)
//! - **BloomFilterPolicy**: per-block-range key filters for cheap negative
//!   lookups
//!
//! ## Example
//!
//! ```no_run
//! use tablekv::sstable::{FileSink, TableBuilder};
//! use tablekv::{CompressionType, Options};
//!
//! # fn main() -> tablekv::Result<()> {
//! let options = Options::default().compression(CompressionType::Snappy);
//! let sink = FileSink::create("000001.sst")?;
//! let mut builder = TableBuilder::new(options, sink, 0);
//!
//! builder.add(b"key1", b"value1")?;
//! builder.add(b"key2", b"value2")?;
//! builder.finish()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod coding;
pub mod comparator;
pub mod config;
pub mod crc32c;
pub mod error;
pub mod filter;
pub mod memtable;
pub mod sstable;
pub mod statistics;
pub mod write_batch;

pub use comparator::{BytewiseComparator, Comparator};
pub use config::{CompressionOptions, CompressionType, Options};
pub use error::{Error, Result};
pub use memtable::MemTable;
pub use statistics::Statistics;
pub use write_batch::WriteBatch;
