//! Block handles and the table footer.
//!
//! A handle names a block by file offset and size (size excludes the
//! 5-byte trailer). The footer is the fixed 48-byte tail of every table:
//! the meta-index handle and index handle, each zero-padded to 20 bytes,
//! followed by the 8-byte magic.

use crate::coding::{decode_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};
use crate::sstable::{FOOTER_SIZE, MAX_ENCODED_HANDLE_LENGTH, TABLE_MAGIC_NUMBER};

/// BlockHandle points at a block within the table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    /// Offset of the block in the file.
    pub offset: u64,
    /// Size of the block in bytes, excluding the trailer.
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Append the varint64 encoding (at most 20 bytes) to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Decode a handle from the front of `src`, returning the remainder.
    pub fn decode(src: &[u8]) -> Result<(Self, &[u8])> {
        let (offset, rest) = get_varint64(src)?;
        let (size, rest) = get_varint64(rest)?;
        Ok((Self { offset, size }, rest))
    }
}

/// Footer is the last 48 bytes of a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the meta-index block.
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Create a new Footer.
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self { metaindex_handle, index_handle }
    }

    /// Encode the footer to its fixed 48-byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);

        self.metaindex_handle.encode_to(&mut buf);
        buf.resize(MAX_ENCODED_HANDLE_LENGTH, 0);

        self.index_handle.encode_to(&mut buf);
        buf.resize(2 * MAX_ENCODED_HANDLE_LENGTH, 0);

        put_fixed64(&mut buf, TABLE_MAGIC_NUMBER);
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Decode a footer from exactly 48 bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let magic = decode_fixed64(&data[FOOTER_SIZE - 8..])?;
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "bad table magic number: expected {:#x}, got {:#x}",
                TABLE_MAGIC_NUMBER, magic
            )));
        }

        let (metaindex_handle, _) = BlockHandle::decode(&data[..MAX_ENCODED_HANDLE_LENGTH])?;
        let (index_handle, _) =
            BlockHandle::decode(&data[MAX_ENCODED_HANDLE_LENGTH..2 * MAX_ENCODED_HANDLE_LENGTH])?;

        Ok(Self { metaindex_handle, index_handle })
    }
}
