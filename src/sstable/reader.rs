//! SSTable reader.
//!
//! Opens a finished table, verifies block trailers, and serves point
//! lookups and full scans. This is the inverse of
//! [`TableBuilder`](crate::sstable::TableBuilder) and is what the
//! round-trip tests drive.

use crate::config::Options;
use crate::crc32c;
use crate::error::{Error, Result};
use crate::filter::FilterPolicy;
use crate::sstable::block::{Block, BlockIterator};
use crate::sstable::compress::decompress_block;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::{
    CompressionType, BLOCK_TRAILER_SIZE, FILTER_BLOCK_PREFIX, FOOTER_SIZE, STATS_BLOCK_KEY,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Read access to one table file.
pub struct TableReader {
    file: Arc<File>,
    index_block: Block,
    metaindex_handle: BlockHandle,
    filter: Option<(Arc<dyn FilterPolicy>, Vec<u8>)>,
    file_size: u64,
}

impl TableReader {
    /// Opens the table at `path`. The options supply the filter policy
    /// used to interpret the table's filter block, if both are present.
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small to be a table"));
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let index_contents = read_block_contents(&mut file, footer.index_handle)?;
        let index_block = Block::new(index_contents)?;

        let mut reader = Self {
            file: Arc::new(file),
            index_block,
            metaindex_handle: footer.metaindex_handle,
            filter: None,
            file_size,
        };

        if let Some(policy) = &options.filter_policy {
            reader.load_filter(policy.clone())?;
        }
        Ok(reader)
    }

    fn load_filter(&mut self, policy: Arc<dyn FilterPolicy>) -> Result<()> {
        let name = format!("{}{}", FILTER_BLOCK_PREFIX, policy.name());
        if let Some(handle) = self.meta_block_handle(&name)? {
            let contents = self.read_block(handle)?;
            self.filter = Some((policy, contents.to_vec()));
        }
        Ok(())
    }

    /// Looks up `name` in the meta-index block.
    fn meta_block_handle(&self, name: &str) -> Result<Option<BlockHandle>> {
        let contents = self.read_block(self.metaindex_handle)?;
        let metaindex = Block::new(contents)?;
        let mut iter = metaindex.iter();
        iter.seek_to_first();
        while iter.advance() {
            if iter.key() == name.as_bytes() {
                let (handle, _) = BlockHandle::decode(iter.value())?;
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Returns the value stored for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // The index key for a block is >= every key inside it, so the
        // first index entry at or past the lookup key names the only
        // block that can contain it.
        let mut index_iter = self.index_block.iter();
        index_iter.seek_to_first();
        while index_iter.advance() {
            if index_iter.key() >= key {
                let (handle, _) = BlockHandle::decode(index_iter.value())?;

                if let Some((policy, filter)) = &self.filter {
                    if let Some(reader) =
                        super::filter_block::FilterBlockReader::new(policy.clone(), filter)
                    {
                        if !reader.key_may_match(handle.offset, key) {
                            return Ok(None);
                        }
                    }
                }

                let block = Block::new(self.read_block(handle)?)?;
                let mut iter = block.iter();
                iter.seek_to_first();
                while iter.advance() {
                    if iter.key() == key {
                        return Ok(Some(iter.value().to_vec()));
                    }
                    if iter.key() > key {
                        break;
                    }
                }
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Decodes the stats block into name → value pairs.
    pub fn stats(&self) -> Result<BTreeMap<String, u64>> {
        let handle = self
            .meta_block_handle(STATS_BLOCK_KEY)?
            .ok_or_else(|| Error::corruption("missing stats block"))?;
        let block = Block::new(self.read_block(handle)?)?;

        let mut stats = BTreeMap::new();
        let mut iter = block.iter();
        iter.seek_to_first();
        while iter.advance() {
            let name = String::from_utf8(iter.key().to_vec())
                .map_err(|_| Error::corruption("non-utf8 stats key"))?;
            let (value, _) = crate::coding::get_varint64(iter.value())?;
            stats.insert(name, value);
        }
        Ok(stats)
    }

    /// Number of data blocks, per the index.
    pub fn num_data_blocks(&self) -> usize {
        let mut iter = self.index_block.iter();
        iter.seek_to_first();
        let mut count = 0;
        while iter.advance() {
            count += 1;
        }
        count
    }

    /// Size of the table file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Iterator over every key-value pair, in key order.
    pub fn iter(&self) -> Result<TableIterator> {
        let mut handles = Vec::new();
        let mut iter = self.index_block.iter();
        iter.seek_to_first();
        while iter.advance() {
            let (handle, _) = BlockHandle::decode(iter.value())?;
            handles.push(handle);
        }
        Ok(TableIterator { file: Arc::clone(&self.file), handles, next_block: 0, current: None })
    }

    fn read_block(&self, handle: BlockHandle) -> Result<Bytes> {
        let mut file = self.file.try_clone().map_err(Error::Io)?;
        read_block_contents(&mut file, handle)
    }
}

/// Reads a block record, verifies its trailer, and decompresses it.
fn read_block_contents(file: &mut File, handle: BlockHandle) -> Result<Bytes> {
    let total = handle.size as usize + BLOCK_TRAILER_SIZE;
    let mut buffer = vec![0u8; total];
    file.seek(SeekFrom::Start(handle.offset))?;
    file.read_exact(&mut buffer)?;

    let data_len = handle.size as usize;
    let type_byte = buffer[data_len];
    let stored = crate::coding::decode_fixed32(&buffer[data_len + 1..])?;

    let expected = crc32c::unmask(stored);
    let actual = crc32c::extend(crc32c::value(&buffer[..data_len]), &buffer[data_len..data_len + 1]);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    let codec = CompressionType::from_u8(type_byte)
        .ok_or_else(|| Error::corruption(format!("unknown block type {}", type_byte)))?;

    buffer.truncate(data_len);
    match codec {
        CompressionType::None => Ok(Bytes::from(buffer)),
        _ => Ok(Bytes::from(decompress_block(codec, &buffer)?)),
    }
}

/// Iterator over all entries of a table.
pub struct TableIterator {
    file: Arc<File>,
    handles: Vec<BlockHandle>,
    next_block: usize,
    current: Option<BlockIterator>,
}

impl TableIterator {
    /// Steps to the next entry; returns false at the end of the table.
    pub fn advance(&mut self) -> Result<bool> {
        loop {
            if let Some(iter) = &mut self.current {
                if iter.advance() {
                    return Ok(true);
                }
            }
            if self.next_block >= self.handles.len() {
                self.current = None;
                return Ok(false);
            }

            let handle = self.handles[self.next_block];
            self.next_block += 1;
            let mut file = self.file.try_clone().map_err(Error::Io)?;
            let block = Block::new(read_block_contents(&mut file, handle)?)?;
            let mut iter = block.iter();
            iter.seek_to_first();
            self.current = Some(iter);
        }
    }

    /// True while positioned on an entry.
    pub fn valid(&self) -> bool {
        self.current.as_ref().map(|i| i.valid()).unwrap_or(false)
    }

    /// Current key.
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().expect("iterator not valid").key()
    }

    /// Current value.
    pub fn value(&self) -> &[u8] {
        self.current.as_ref().expect("iterator not valid").value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::filter::BloomFilterPolicy;
    use crate::sstable::builder::TableBuilder;
    use crate::sstable::sink::FileSink;
    use tempfile::NamedTempFile;

    fn build_table(options: &Options, entries: &[(&[u8], &[u8])]) -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        let sink = FileSink::create(tmp.path()).unwrap();
        let mut builder = TableBuilder::new(options.clone(), sink, 0);
        for (key, value) in entries {
            builder.add(key, value).unwrap();
        }
        builder.finish().unwrap();
        tmp
    }

    #[test]
    fn test_reader_get() {
        let options = Options::default().compression(CompressionType::None);
        let tmp = build_table(
            &options,
            &[(b"apple", b"red"), (b"banana", b"yellow"), (b"cherry", b"red")],
        );
        let reader = TableReader::open(tmp.path(), &options).unwrap();

        assert_eq!(reader.get(b"apple").unwrap(), Some(b"red".to_vec()));
        assert_eq!(reader.get(b"banana").unwrap(), Some(b"yellow".to_vec()));
        assert_eq!(reader.get(b"cherry").unwrap(), Some(b"red".to_vec()));
        assert_eq!(reader.get(b"durian").unwrap(), None);
        assert_eq!(reader.get(b"aaa").unwrap(), None);
        assert_eq!(reader.num_data_blocks(), 1);
    }

    #[test]
    fn test_reader_multi_block_scan() {
        let options =
            Options::default().compression(CompressionType::None).block_size(256);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..500)
            .map(|i| {
                (format!("key{:06}", i).into_bytes(), format!("value{:06}", i).into_bytes())
            })
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        let tmp = build_table(&options, &borrowed);

        let reader = TableReader::open(tmp.path(), &options).unwrap();
        assert!(reader.num_data_blocks() > 1);

        let mut iter = reader.iter().unwrap();
        let mut seen = Vec::new();
        while iter.advance().unwrap() {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
        }
        assert_eq!(seen, entries);

        assert_eq!(reader.get(b"key000250").unwrap(), Some(b"value000250".to_vec()));
    }

    #[test]
    fn test_reader_with_filter() {
        let options = Options::default()
            .compression(CompressionType::None)
            .filter_policy(Arc::new(BloomFilterPolicy::new(10)));
        let tmp = build_table(&options, &[(b"hello", b"1"), (b"world", b"2")]);

        let reader = TableReader::open(tmp.path(), &options).unwrap();
        assert!(reader.filter.is_some());
        assert_eq!(reader.get(b"hello").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reader.get(b"missing").unwrap(), None);
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_reader_compressed_table() {
        let options =
            Options::default().compression(CompressionType::Snappy).block_size(512);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..200)
            .map(|i| (format!("key{:06}", i).into_bytes(), b"a repetitive value".to_vec()))
            .collect();
        let borrowed: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
        let tmp = build_table(&options, &borrowed);

        let reader = TableReader::open(tmp.path(), &options).unwrap();
        let mut iter = reader.iter().unwrap();
        let mut count = 0;
        while iter.advance().unwrap() {
            count += 1;
        }
        assert_eq!(count, 200);
    }

    #[test]
    fn test_reader_detects_corruption() {
        let options = Options::default().compression(CompressionType::None);
        let tmp = build_table(&options, &[(b"key1", b"value1")]);

        // Flip a byte inside the first data block.
        use std::io::Write;
        let mut file =
            std::fs::OpenOptions::new().write(true).open(tmp.path()).unwrap();
        file.seek(SeekFrom::Start(3)).unwrap();
        file.write_all(&[0xff]).unwrap();
        drop(file);

        let reader = TableReader::open(tmp.path(), &options).unwrap();
        assert!(matches!(reader.get(b"key1"), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_reader_rejects_truncated_file() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a table").unwrap();
        let options = Options::default();
        assert!(TableReader::open(tmp.path(), &options).is_err());
    }
}
