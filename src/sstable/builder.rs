//! Table builder: streams sorted key-value pairs into an SSTable file.
//!
//! ```no_run
//! use tablekv::sstable::{FileSink, TableBuilder};
//! use tablekv::Options;
//!
//! # fn main() -> tablekv::Result<()> {
//! let sink = FileSink::create("table.sst")?;
//! let mut builder = TableBuilder::new(Options::default(), sink, 0);
//! builder.add(b"key1", b"value1")?;
//! builder.add(b"key2", b"value2")?;
//! builder.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! The builder owns the sink and two block builders (data and index), plus
//! an optional filter-block builder. Output bytes appear in the sink in
//! emission order: data blocks as they fill, then on `finish` the filter
//! block, stats block, meta-index block, index block, and footer.

use crate::comparator::{BytewiseComparator, Comparator};
use crate::config::{CompressionOptions, CompressionType, Options};
use crate::crc32c;
use crate::error::{Error, Result};
use crate::sstable::block::BlockBuilder;
use crate::sstable::compress::compress_block;
use crate::sstable::filter_block::FilterBlockBuilder;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::sink::TableSink;
use crate::sstable::{stats_names, BLOCK_TRAILER_SIZE, FILTER_BLOCK_PREFIX, STATS_BLOCK_KEY};
use crate::statistics::Statistics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Builds an SSTable from strictly ascending key-value pairs.
///
/// A builder is single-owner and single-threaded; it holds no locks. The
/// first sink error is sticky: later `add`/`flush` calls become no-ops and
/// the stored status is reported by [`status`](Self::status) and
/// [`finish`](Self::finish).
pub struct TableBuilder<S: TableSink> {
    options: Options,
    sink: S,
    offset: u64,
    status: Option<Error>,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    num_data_blocks: u64,
    raw_key_size: u64,
    raw_value_size: u64,
    data_size: u64,
    closed: bool,
    filter_block: Option<FilterBlockBuilder>,

    // The index entry for a finished data block is withheld until the
    // first key of the next block arrives, so the separator can be
    // shortened to fall between the two blocks.
    //
    // Invariant: pending_index_entry is true only if data_block is empty.
    pending_index_entry: bool,
    pending_handle: BlockHandle,

    compressed_output: Vec<u8>,
    level: i32,
}

impl<S: TableSink> TableBuilder<S> {
    /// Creates a builder writing into `sink` for a table at `level`
    /// (`-1` when the level is unknown; only used to pick a codec from
    /// `compression_per_level`).
    pub fn new(options: Options, sink: S, level: i32) -> Self {
        let data_block =
            BlockBuilder::new(options.block_restart_interval, options.comparator.clone());
        // Every index entry is a restart point: no prefix sharing, so
        // readers can binary search the index directly.
        let index_block = BlockBuilder::new(1, options.comparator.clone());
        let mut filter_block =
            options.filter_policy.clone().map(FilterBlockBuilder::new);
        if let Some(fb) = &mut filter_block {
            fb.start_block(0);
        }

        Self {
            options,
            sink,
            offset: 0,
            status: None,
            data_block,
            index_block,
            last_key: Vec::new(),
            num_entries: 0,
            num_data_blocks: 0,
            raw_key_size: 0,
            raw_value_size: 0,
            data_size: 0,
            closed: false,
            filter_block,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            compressed_output: Vec::new(),
            level,
        }
    }

    /// Replaces the options mid-build. The comparator must not change;
    /// other changes take effect at the next block boundary.
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::invalid_argument("changing comparator while building table"));
        }
        self.options = options;
        Ok(())
    }

    /// Adds a key-value pair. Keys must be strictly ascending under the
    /// configured comparator.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_argument("add called on a finished table"));
        }
        if self.status.is_some() {
            return Ok(());
        }
        if self.num_entries > 0
            && self.options.comparator.compare(key, &self.last_key) != std::cmp::Ordering::Greater
        {
            return Err(Error::invalid_argument("keys must be added in strictly ascending order"));
        }

        // Flush when the block is full, or - with a non-zero deviation -
        // when this entry would overflow a block that is already close
        // enough to the target size.
        let curr_size = self.data_block.current_size_estimate();
        let estimated_size_after = self.data_block.estimate_size_after(key, value);
        if curr_size >= self.options.block_size
            || (estimated_size_after > self.options.block_size
                && self.options.block_size_deviation > 0
                && (curr_size as u64 * 100)
                    > self.options.block_size as u64
                        * (100 - self.options.block_size_deviation) as u64)
        {
            self.flush()?;
        }

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            let comparator = self.options.comparator.clone();
            comparator.find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.data_block.add(key, value);
        self.num_entries += 1;
        self.raw_key_size += key.len() as u64;
        self.raw_value_size += value.len() as u64;
        Ok(())
    }

    /// Finalizes the current data block and appends it to the sink.
    /// No-op when the data block is empty or the builder is in error.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_argument("flush called on a finished table"));
        }
        if self.status.is_some() || self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(!self.pending_index_entry);

        let codec = self.block_codec();
        let opts = self.options.compression_opts;
        let result = Self::write_block(
            &mut self.data_block,
            codec,
            opts,
            &mut self.compressed_output,
            &mut self.sink,
            &mut self.offset,
            self.options.statistics.as_deref(),
        );
        self.pending_handle = self.check(result)?;
        self.pending_index_entry = true;
        let flushed = self.sink.flush();
        self.check(flushed)?;

        // Option changes land here, at the block boundary.
        self.data_block.reset_interval(self.options.block_restart_interval);

        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }
        self.data_size = self.offset;
        self.num_data_blocks += 1;
        Ok(())
    }

    /// Writes all trailing blocks and the footer, then closes the builder.
    /// Returns the first error encountered during the build, if any.
    pub fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_argument("finish called on a closed table"));
        }
        // A flush failure is sticky and reported below; the builder still
        // transitions to closed.
        let _ = self.flush();
        self.closed = true;

        // Filter block. Never compressed: it is consulted before blocks
        // are decompressed, and bloom bits do not compress anyway.
        let mut filter_handle = None;
        if self.status.is_none() {
            if let Some(fb) = self.filter_block.take() {
                let contents = fb.finish();
                let result = Self::write_raw_block_to(
                    &mut self.sink,
                    &mut self.offset,
                    self.options.statistics.as_deref(),
                    &contents,
                    CompressionType::None,
                );
                filter_handle = Some(self.check(result)?);
            }
        }

        // The final data block has no successor key, so close its index
        // entry with a short successor of the last key.
        if self.status.is_none() && self.pending_index_entry {
            let comparator = self.options.comparator.clone();
            comparator.find_short_successor(&mut self.last_key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        // Stats block, then the meta-index naming every meta block.
        // Both are keyed bytewise regardless of the table comparator.
        let mut metaindex_handle = BlockHandle::default();
        if self.status.is_none() {
            let bytewise: Arc<dyn Comparator> = Arc::new(BytewiseComparator);
            let mut meta_handles: BTreeMap<String, Vec<u8>> = BTreeMap::new();

            if let (Some(policy), Some(handle)) = (&self.options.filter_policy, filter_handle) {
                let mut handle_encoding = Vec::new();
                handle.encode_to(&mut handle_encoding);
                meta_handles
                    .insert(format!("{}{}", FILTER_BLOCK_PREFIX, policy.name()), handle_encoding);
            }

            let mut stats_block =
                BlockBuilder::new(self.options.block_restart_interval, bytewise.clone());
            let stats = self.collect_stats();
            for (name, value) in &stats {
                stats_block.add(name.as_bytes(), value);
            }
            let codec = self.block_codec();
            let opts = self.options.compression_opts;
            let result = Self::write_block(
                &mut stats_block,
                codec,
                opts,
                &mut self.compressed_output,
                &mut self.sink,
                &mut self.offset,
                self.options.statistics.as_deref(),
            );
            let stats_handle = self.check(result)?;
            let mut handle_encoding = Vec::new();
            stats_handle.encode_to(&mut handle_encoding);
            meta_handles.insert(STATS_BLOCK_KEY.to_string(), handle_encoding);

            let mut meta_index_block =
                BlockBuilder::new(self.options.block_restart_interval, bytewise);
            for (name, handle_encoding) in &meta_handles {
                meta_index_block.add(name.as_bytes(), handle_encoding);
            }
            let result = Self::write_block(
                &mut meta_index_block,
                codec,
                opts,
                &mut self.compressed_output,
                &mut self.sink,
                &mut self.offset,
                self.options.statistics.as_deref(),
            );
            metaindex_handle = self.check(result)?;
        }

        // Index block.
        let mut index_handle = BlockHandle::default();
        if self.status.is_none() {
            let codec = self.block_codec();
            let opts = self.options.compression_opts;
            let result = Self::write_block(
                &mut self.index_block,
                codec,
                opts,
                &mut self.compressed_output,
                &mut self.sink,
                &mut self.offset,
                self.options.statistics.as_deref(),
            );
            index_handle = self.check(result)?;
        }

        // Footer.
        if self.status.is_none() {
            let footer = Footer::new(metaindex_handle, index_handle);
            let encoding = footer.encode();
            let appended = self.sink.append(&encoding);
            self.check(appended)?;
            self.offset += encoding.len() as u64;
        }

        self.status()
    }

    /// Marks the builder closed without writing trailing bytes. The
    /// output is incomplete and should be deleted by the caller.
    pub fn abandon(&mut self) {
        self.closed = true;
    }

    /// First error encountered, or `Ok` while the build is healthy.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes handed to the sink so far; after a successful `finish` this
    /// is the complete file size.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    fn block_codec(&self) -> CompressionType {
        if self.options.compression_per_level.is_empty() {
            return self.options.compression;
        }
        // Negative levels read the first slot; levels at or past the end
        // read the last slot.
        let last = self.options.compression_per_level.len() as i32 - 1;
        let index = self.level.clamp(0, last) as usize;
        self.options.compression_per_level[index]
    }

    fn collect_stats(&self) -> BTreeMap<&'static str, Vec<u8>> {
        let mut stats = BTreeMap::new();
        let mut add_stat = |name: &'static str, value: u64| {
            let mut encoded = Vec::new();
            crate::coding::put_varint64(&mut encoded, value);
            let previous = stats.insert(name, encoded);
            debug_assert!(previous.is_none());
        };

        add_stat(stats_names::RAW_KEY_SIZE, self.raw_key_size);
        add_stat(stats_names::RAW_VALUE_SIZE, self.raw_value_size);
        add_stat(stats_names::DATA_SIZE, self.data_size);
        add_stat(
            stats_names::INDEX_SIZE,
            (self.index_block.current_size_estimate() + BLOCK_TRAILER_SIZE) as u64,
        );
        add_stat(stats_names::NUM_ENTRIES, self.num_entries);
        add_stat(stats_names::NUM_DATA_BLOCKS, self.num_data_blocks);
        stats
    }

    /// Records the first error and passes the result through.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.status.is_none() {
                self.status = Some(e.clone());
            }
        }
        result
    }

    /// Finalizes `block`, compresses it, appends it with its trailer, and
    /// resets the block for reuse. `scratch` holds the compressed bytes
    /// and is invalidated by the next call.
    fn write_block(
        block: &mut BlockBuilder,
        codec: CompressionType,
        opts: CompressionOptions,
        scratch: &mut Vec<u8>,
        sink: &mut S,
        offset: &mut u64,
        statistics: Option<&Statistics>,
    ) -> Result<BlockHandle> {
        let raw = block.finish();
        let (contents, ty) = compress_block(codec, &opts, raw, scratch);
        let handle = Self::write_raw_block_to(sink, offset, statistics, contents, ty)?;
        block.reset();
        scratch.clear();
        Ok(handle)
    }

    /// Appends `contents` plus the 5-byte trailer
    /// `[type, fixed32(masked_crc)]`, advancing `offset` on success.
    fn write_raw_block_to(
        sink: &mut S,
        offset: &mut u64,
        statistics: Option<&Statistics>,
        contents: &[u8],
        ty: CompressionType,
    ) -> Result<BlockHandle> {
        let start = statistics.map(|_| Instant::now());

        let handle = BlockHandle::new(*offset, contents.len() as u64);
        sink.append(contents)?;

        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = ty as u8;
        // The CRC covers the block bytes and the type byte.
        let crc = crc32c::extend(crc32c::value(contents), &trailer[..1]);
        trailer[1..].copy_from_slice(&crc32c::mask(crc).to_le_bytes());
        sink.append(&trailer)?;
        *offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;

        if let (Some(stats), Some(start)) = (statistics, start) {
            stats.record_write_raw_block_micros(start.elapsed().as_micros() as u64);
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::{FOOTER_SIZE, TABLE_MAGIC_NUMBER};

    fn plain_options() -> Options {
        Options::default().compression(CompressionType::None)
    }

    /// Sink that fails every append after the first `allowed`.
    struct FailingSink {
        written: Vec<u8>,
        allowed: usize,
        appends: usize,
    }

    impl TableSink for FailingSink {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.appends += 1;
            if self.appends > self.allowed {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected sink failure",
                )));
            }
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_table_has_footer() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.finish().unwrap();

        let file = &builder.sink;
        assert_eq!(builder.file_size() as usize, file.len());
        assert!(file.len() >= FOOTER_SIZE);

        let magic = u64::from_le_bytes(file[file.len() - 8..].try_into().unwrap());
        assert_eq!(magic, TABLE_MAGIC_NUMBER);

        let footer = Footer::decode(&file[file.len() - FOOTER_SIZE..]).unwrap();
        // Empty table: no data blocks, but stats/meta-index/index exist.
        assert!(footer.index_handle.offset > 0);
        assert_eq!(builder.num_entries(), 0);
    }

    #[test]
    fn test_add_tracks_last_key_and_counts() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.add(b"apple", b"red").unwrap();
        builder.add(b"banana", b"yellow").unwrap();

        assert_eq!(builder.num_entries(), 2);
        assert_eq!(builder.last_key, b"banana");
        assert_eq!(builder.raw_key_size, 11);
        assert_eq!(builder.raw_value_size, 9);
        builder.finish().unwrap();
    }

    #[test]
    fn test_rejects_out_of_order_keys() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.add(b"b", b"2").unwrap();

        assert!(builder.add(b"a", b"1").is_err());
        assert!(builder.add(b"b", b"dup").is_err());
        // The rejection is not sticky.
        builder.add(b"c", b"3").unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_rejects_use_after_close() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.finish().unwrap();
        assert!(builder.add(b"a", b"1").is_err());
        assert!(builder.flush().is_err());
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_abandon_writes_no_trailer() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.add(b"key", b"value").unwrap();
        builder.abandon();

        // Nothing was flushed, nothing trailing was written.
        assert!(builder.sink.is_empty());
        assert!(builder.add(b"more", b"data").is_err());
    }

    #[test]
    fn test_pending_index_entry_invariant() {
        let mut builder =
            TableBuilder::new(plain_options().block_size(64).block_size_deviation(0), Vec::new(), 0);
        for i in 0..50 {
            let key = format!("key{:04}", i);
            builder.add(key.as_bytes(), b"value").unwrap();
            assert!(!builder.pending_index_entry || builder.data_block.is_empty());
        }
        builder.finish().unwrap();
        assert!(builder.num_data_blocks > 1);
    }

    #[test]
    fn test_sink_error_is_sticky() {
        let sink = FailingSink { written: Vec::new(), allowed: 0, appends: 0 };
        let mut builder = TableBuilder::new(plain_options().block_size(64), sink, 0);

        // Fill far enough to force a flush, which hits the failing sink.
        let mut saw_error = false;
        for i in 0..100 {
            let key = format!("key{:04}", i);
            if builder.add(key.as_bytes(), b"some value here").is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        assert!(builder.status().is_err());

        // Later adds are silent no-ops and do not change the count.
        let entries = builder.num_entries();
        builder.add(b"zzz", b"ignored").unwrap();
        assert_eq!(builder.num_entries(), entries);

        // finish reports the stored error.
        assert!(matches!(builder.finish(), Err(Error::Io(_))));
    }

    #[test]
    fn test_change_options_rejects_new_comparator() {
        struct ReverseComparator;
        impl Comparator for ReverseComparator {
            fn name(&self) -> &'static str {
                "test.ReverseComparator"
            }
            fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
                b.cmp(a)
            }
            fn find_shortest_separator(&self, _start: &mut Vec<u8>, _limit: &[u8]) {}
            fn find_short_successor(&self, _key: &mut Vec<u8>) {}
        }

        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        let changed = plain_options().comparator(Arc::new(ReverseComparator));
        assert!(matches!(builder.change_options(changed), Err(Error::InvalidArgument(_))));

        // Same comparator, different block size: accepted.
        builder.change_options(plain_options().block_size(1 << 16)).unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_per_level_codec_selection() {
        let per_level =
            vec![CompressionType::None, CompressionType::Snappy, CompressionType::Zlib];
        let options = plain_options().compression_per_level(per_level);

        let cases = [
            (-1, CompressionType::None),
            (0, CompressionType::None),
            (1, CompressionType::Snappy),
            (2, CompressionType::Zlib),
            // One past the end and beyond read the last slot.
            (3, CompressionType::Zlib),
            (7, CompressionType::Zlib),
        ];
        for (level, expected) in cases {
            let builder = TableBuilder::new(options.clone(), Vec::new(), level);
            assert_eq!(builder.block_codec(), expected, "level {}", level);
        }
    }

    #[test]
    fn test_stats_are_varint_encoded_and_sorted() {
        let mut builder = TableBuilder::new(plain_options(), Vec::new(), 0);
        builder.add(b"k", b"v").unwrap();
        builder.flush().unwrap();

        let stats = builder.collect_stats();
        let names: Vec<_> = stats.keys().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(stats.len(), 6);

        let (num_entries, rest) =
            crate::coding::get_varint64(&stats[stats_names::NUM_ENTRIES]).unwrap();
        assert_eq!(num_entries, 1);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_statistics_hook_records_appends() {
        let stats = Arc::new(Statistics::new());
        let options = plain_options().statistics(stats.clone());
        let mut builder = TableBuilder::new(options, Vec::new(), 0);
        builder.add(b"k", b"v").unwrap();
        builder.finish().unwrap();

        // One data block + stats + meta-index + index.
        assert_eq!(stats.write_raw_block_calls(), 4);
    }
}
