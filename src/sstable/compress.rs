//! Block compression adapter.
//!
//! Presents one interface over the supported codecs. Compression is
//! advisory: a codec that is unavailable, fails, or does not save more
//! than 12.5% of the raw size falls back to storing the block
//! uncompressed with type [`CompressionType::None`].

use crate::config::{CompressionOptions, CompressionType};
use crate::error::{Error, Result};

/// True when the compressed form saves more than 12.5% over raw.
fn good_compression_ratio(compressed_size: usize, raw_size: usize) -> bool {
    compressed_size < raw_size - (raw_size / 8)
}

/// Compress `raw` with `codec` into `scratch`, returning the bytes to
/// write and the type byte describing them.
///
/// The returned slice either borrows `raw` (pass-through) or `scratch`;
/// `scratch` contents are invalidated by the next call, so the caller must
/// not hold the view across block boundaries.
pub fn compress_block<'a>(
    codec: CompressionType,
    opts: &CompressionOptions,
    raw: &'a [u8],
    scratch: &'a mut Vec<u8>,
) -> (&'a [u8], CompressionType) {
    let compressed = match codec {
        CompressionType::None => false,
        CompressionType::Snappy => snappy_compress(raw, scratch),
        CompressionType::Zlib => zlib_compress(opts, raw, scratch),
        CompressionType::Bzip2 => bzip2_compress(opts, raw, scratch),
    };

    if compressed && good_compression_ratio(scratch.len(), raw.len()) {
        (scratch.as_slice(), codec)
    } else {
        (raw, CompressionType::None)
    }
}

/// Decompress `data` that was stored with `codec`.
pub fn decompress_block(codec: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => snappy_decompress(data),
        CompressionType::Zlib => zlib_decompress(data),
        CompressionType::Bzip2 => bzip2_decompress(data),
    }
}

#[cfg(feature = "snappy")]
fn snappy_compress(raw: &[u8], scratch: &mut Vec<u8>) -> bool {
    scratch.clear();
    scratch.resize(snap::raw::max_compress_len(raw.len()), 0);
    match snap::raw::Encoder::new().compress(raw, scratch) {
        Ok(len) => {
            scratch.truncate(len);
            true
        }
        Err(e) => {
            log::warn!("snappy compression failed, storing raw: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "snappy"))]
fn snappy_compress(_raw: &[u8], _scratch: &mut Vec<u8>) -> bool {
    false
}

#[cfg(feature = "snappy")]
fn snappy_decompress(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|e| Error::corruption(format!("snappy decompression failed: {}", e)))
}

#[cfg(not(feature = "snappy"))]
fn snappy_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::corruption("snappy support not compiled in"))
}

#[cfg(feature = "zlib")]
fn zlib_compress(opts: &CompressionOptions, raw: &[u8], scratch: &mut Vec<u8>) -> bool {
    use std::io::Write;

    scratch.clear();
    let level = flate2::Compression::new(opts.level.min(9));
    let mut encoder = flate2::write::ZlibEncoder::new(std::mem::take(scratch), level);
    let ok = encoder.write_all(raw).is_ok();
    match encoder.finish() {
        Ok(buf) if ok => {
            *scratch = buf;
            true
        }
        Ok(buf) => {
            *scratch = buf;
            false
        }
        Err(e) => {
            log::warn!("zlib compression failed, storing raw: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "zlib"))]
fn zlib_compress(_opts: &CompressionOptions, _raw: &[u8], _scratch: &mut Vec<u8>) -> bool {
    false
}

#[cfg(feature = "zlib")]
fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::corruption(format!("zlib decompression failed: {}", e)))?;
    Ok(out)
}

#[cfg(not(feature = "zlib"))]
fn zlib_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::corruption("zlib support not compiled in"))
}

#[cfg(feature = "bzip2-compression")]
fn bzip2_compress(opts: &CompressionOptions, raw: &[u8], scratch: &mut Vec<u8>) -> bool {
    use std::io::Write;

    scratch.clear();
    let level = bzip2::Compression::new(opts.level.clamp(1, 9));
    let mut encoder = bzip2::write::BzEncoder::new(std::mem::take(scratch), level);
    let ok = encoder.write_all(raw).is_ok();
    match encoder.finish() {
        Ok(buf) if ok => {
            *scratch = buf;
            true
        }
        Ok(buf) => {
            *scratch = buf;
            false
        }
        Err(e) => {
            log::warn!("bzip2 compression failed, storing raw: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "bzip2-compression"))]
fn bzip2_compress(_opts: &CompressionOptions, _raw: &[u8], _scratch: &mut Vec<u8>) -> bool {
    false
}

#[cfg(feature = "bzip2-compression")]
fn bzip2_decompress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::new();
    bzip2::read::BzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::corruption(format!("bzip2 decompression failed: {}", e)))?;
    Ok(out)
}

#[cfg(not(feature = "bzip2-compression"))]
fn bzip2_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::corruption("bzip2 support not compiled in"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressible() -> Vec<u8> {
        b"a very repetitive payload ".repeat(64)
    }

    #[test]
    fn test_none_passes_through() {
        let raw = compressible();
        let mut scratch = Vec::new();
        let (out, ty) =
            compress_block(CompressionType::None, &CompressionOptions::default(), &raw, &mut scratch);
        assert_eq!(out, raw.as_slice());
        assert_eq!(ty, CompressionType::None);
    }

    #[test]
    fn test_good_ratio_gate() {
        assert!(good_compression_ratio(80, 100));
        assert!(!good_compression_ratio(88, 100)); // exactly 12% saved
        assert!(!good_compression_ratio(100, 100));
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_snappy_roundtrip() {
        let raw = compressible();
        let mut scratch = Vec::new();
        let (out, ty) = compress_block(
            CompressionType::Snappy,
            &CompressionOptions::default(),
            &raw,
            &mut scratch,
        );
        assert_eq!(ty, CompressionType::Snappy);
        assert!(out.len() < raw.len());
        assert_eq!(decompress_block(ty, out).unwrap(), raw);
    }

    #[cfg(feature = "zlib")]
    #[test]
    fn test_zlib_roundtrip() {
        let raw = compressible();
        let mut scratch = Vec::new();
        let (out, ty) = compress_block(
            CompressionType::Zlib,
            &CompressionOptions::default(),
            &raw,
            &mut scratch,
        );
        assert_eq!(ty, CompressionType::Zlib);
        assert_eq!(decompress_block(ty, out).unwrap(), raw);
    }

    #[cfg(feature = "bzip2-compression")]
    #[test]
    fn test_bzip2_roundtrip() {
        let raw = compressible();
        let mut scratch = Vec::new();
        let (out, ty) = compress_block(
            CompressionType::Bzip2,
            &CompressionOptions::default(),
            &raw,
            &mut scratch,
        );
        assert_eq!(ty, CompressionType::Bzip2);
        assert_eq!(decompress_block(ty, out).unwrap(), raw);
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_incompressible_falls_back() {
        // High-entropy bytes from a simple xorshift; snappy cannot save
        // 12.5% on these.
        let mut state = 0x9e3779b97f4a7c15u64;
        let raw: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();

        let mut scratch = Vec::new();
        let (out, ty) = compress_block(
            CompressionType::Snappy,
            &CompressionOptions::default(),
            &raw,
            &mut scratch,
        );
        assert_eq!(ty, CompressionType::None);
        assert_eq!(out, raw.as_slice());
    }
}
