//! Checksummed, optionally compressed pages.

use super::file::FileReader;
use crate::config::CompressionType;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Compression byte plus checksum.
pub(crate) const PAGE_TRAILER_SIZE: usize = 5;

/// Location of one page, trailer included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PagePointer {
    /// Offset of the first body byte.
    pub offset: u64,
    /// Size of body and trailer.
    pub size: u32,
}

impl PagePointer {
    /// Creates a pointer.
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// Offset one past the last byte.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Compresses `body` and appends the page trailer.
pub(crate) fn encode_page(body: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let stored = match compression {
        CompressionType::None => body.to_vec(),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(body)
            .map_err(|e| Error::internal(format!("Compression failed: {}", e)))?,
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::compress(body, None, true)
            .map_err(|e| Error::internal(format!("Compression failed: {}", e)))?,
    };

    let mut page = Vec::with_capacity(stored.len() + PAGE_TRAILER_SIZE);
    page.extend_from_slice(&stored);
    page.push(compression as u8);
    page.extend_from_slice(&crc32c::crc32c(&stored).to_le_bytes());
    Ok(page)
}

/// Reads the page at `pointer`, verifies its checksum and decompresses it.
pub(crate) fn read_page(file: &FileReader, pointer: &PagePointer) -> Result<Bytes> {
    let total_size = pointer.size as usize;
    if total_size < PAGE_TRAILER_SIZE {
        return Err(Error::corruption(format!(
            "page at offset {} in {} is too small: {} bytes",
            pointer.offset,
            file.path().display(),
            total_size
        )));
    }

    let buffer = file.read_at(pointer.offset, total_size)?;
    let body_size = total_size - PAGE_TRAILER_SIZE;
    let body = &buffer[..body_size];
    let compression_type = buffer[body_size];
    let stored_checksum = u32::from_le_bytes([
        buffer[body_size + 1],
        buffer[body_size + 2],
        buffer[body_size + 3],
        buffer[body_size + 4],
    ]);

    let computed_checksum = crc32c::crc32c(body);
    if computed_checksum != stored_checksum {
        log::warn!(
            "page checksum mismatch at offset {} in {}",
            pointer.offset,
            file.path().display()
        );
        return Err(Error::ChecksumMismatch { expected: stored_checksum, actual: computed_checksum });
    }

    let compression = CompressionType::from_u8(compression_type).ok_or_else(|| {
        Error::corruption(format!(
            "unknown page compression type {} in {}",
            compression_type,
            file.path().display()
        ))
    })?;

    let decompressed = match compression {
        CompressionType::None => body.to_vec(),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(body)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))?,
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::decompress(body, None)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))?,
    };

    Ok(Bytes::from(decompressed))
}
