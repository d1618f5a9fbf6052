//! Segment footer and trailer.

use super::page::PagePointer;
use super::{FORMAT_VERSION, SEGMENT_MAGIC, TRAILER_SIZE};
use crate::error::{Error, Result};
use crate::types::{Datum, PrimitiveType};
use serde::{Deserialize, Serialize};

/// Per-column min/max statistics of one segment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneMap {
    /// Smallest non-null value, if any.
    pub min: Option<Datum>,
    /// Largest non-null value, if any.
    pub max: Option<Datum>,
    /// Some row is null.
    pub has_null: bool,
    /// Some row is not null.
    pub has_not_null: bool,
}

impl ZoneMap {
    /// Folds one cell into the statistics.
    pub fn update(&mut self, cell: Option<&Datum>) {
        let Some(value) = cell else {
            self.has_null = true;
            return;
        };
        self.has_not_null = true;
        if self.min.as_ref().map_or(true, |min| value < min) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |max| value > max) {
            self.max = Some(value.clone());
        }
    }
}

/// One data page of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPageMeta {
    /// Page location.
    pub pointer: PagePointer,
    /// Ordinal of the first row in the page.
    pub first_ordinal: u64,
    /// Rows in the page.
    pub num_rows: u32,
}

/// Footer entry of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Position in the footer.
    pub ordinal: u32,
    /// Schema unique id of the column.
    pub unique_id: u32,
    /// Stored type.
    pub field_type: PrimitiveType,
    /// Stored nullability.
    pub is_nullable: bool,
    /// Data pages in row order.
    pub data_pages: Vec<DataPageMeta>,
    /// Statistics over the whole column.
    pub zone_map: Option<ZoneMap>,
    /// Bitmap index page, if the column is indexed.
    pub bitmap_index_page: Option<PagePointer>,
}

/// Structured footer of a segment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFooter {
    /// Format version.
    pub version: u32,
    /// Row count.
    pub num_rows: u64,
    /// Column entries, ordered by ordinal.
    pub columns: Vec<ColumnMeta>,
    /// Short-key index page.
    pub short_key_index_page: PagePointer,
    /// Number of key columns in each short key.
    pub num_short_key_columns: u32,
    /// Rows per short-key index entry.
    pub num_rows_per_block: u32,
}

impl SegmentFooter {
    /// Serialises the footer body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialises a footer body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let footer: SegmentFooter = bincode::deserialize(data)
            .map_err(|e| Error::corruption(format!("malformed footer: {}", e)))?;
        if footer.version != FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "unsupported footer version {}, expected {}",
                footer.version, FORMAT_VERSION
            )));
        }
        if footer.num_rows_per_block == 0 {
            return Err(Error::corruption("footer has num_rows_per_block = 0"));
        }
        if footer.columns.iter().enumerate().any(|(i, c)| c.ordinal as usize != i) {
            return Err(Error::corruption("footer column ordinals are not dense"));
        }
        Ok(footer)
    }
}

/// The fixed 12-byte trailer closing a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Footer body length.
    pub footer_len: u32,
    /// CRC32C of the footer body.
    pub footer_checksum: u32,
}

impl Trailer {
    /// Encodes the trailer, magic included.
    pub fn encode(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[0..4].copy_from_slice(&self.footer_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.footer_checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&SEGMENT_MAGIC);
        buf
    }

    /// Decodes a trailer, checking the magic.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != TRAILER_SIZE {
            return Err(Error::corruption(format!(
                "trailer size mismatch: expected {}, got {}",
                TRAILER_SIZE,
                data.len()
            )));
        }
        let magic = &data[8..12];
        if magic != SEGMENT_MAGIC {
            return Err(Error::corruption(format!(
                "bad segment magic: expected {:?}, got {:?}",
                SEGMENT_MAGIC, magic
            )));
        }
        let footer_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let footer_checksum = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Ok(Self { footer_len, footer_checksum })
    }
}
