//! Column readers, column iterators and bitmap index access.

use super::file::FileReader;
use super::footer::{ColumnMeta, DataPageMeta, ZoneMap};
use super::page::read_page;
use crate::error::{Error, Result};
use crate::predicate::ColumnPredicate;
use crate::schema::TabletColumn;
use crate::types::{Datum, PrimitiveType};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cells of one data page in row order.
pub(crate) type PageCells = Vec<Option<Datum>>;

/// Sequential access to one column's cells.
pub trait ColumnIterator: Send {
    /// Positions the iterator at row `ordinal`.
    fn seek_to_ordinal(&mut self, ordinal: u64) -> Result<()>;

    /// Appends up to `n` cells to `dst` and returns how many were read.
    fn next_batch(&mut self, n: usize, dst: &mut Vec<Option<Datum>>) -> Result<usize>;

    /// Ordinal of the next cell.
    fn current_ordinal(&self) -> u64;
}

/// Reads one column stored in a segment.
#[derive(Debug, Clone)]
pub struct ColumnReader {
    meta: Arc<ColumnMeta>,
    file: Arc<FileReader>,
    num_rows: u64,
}

impl ColumnReader {
    /// Creates a reader for the column described by `meta`.
    ///
    /// The data pages must tile `0..num_rows` in order, without gaps or
    /// overlaps.
    pub fn new(meta: ColumnMeta, file: Arc<FileReader>, num_rows: u64) -> Result<Self> {
        let mut covered = 0u64;
        for (i, page) in meta.data_pages.iter().enumerate() {
            if page.first_ordinal != covered {
                return Err(Error::corruption(format!(
                    "column {} in {}: data page {} starts at ordinal {}, expected {}",
                    meta.unique_id,
                    file.path().display(),
                    i,
                    page.first_ordinal,
                    covered
                )));
            }
            covered += page.num_rows as u64;
        }
        if covered != num_rows {
            return Err(Error::corruption(format!(
                "column {} in {} covers {} rows, segment has {}",
                meta.unique_id,
                file.path().display(),
                covered,
                num_rows
            )));
        }
        Ok(Self { meta: Arc::new(meta), file, num_rows })
    }

    /// Footer entry of the column.
    pub fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    /// Stored type.
    pub fn field_type(&self) -> PrimitiveType {
        self.meta.field_type
    }

    /// The column carries min/max statistics.
    pub fn has_zone_map(&self) -> bool {
        self.meta.zone_map.is_some()
    }

    /// The column's statistics.
    pub fn zone_map(&self) -> Option<&ZoneMap> {
        self.meta.zone_map.as_ref()
    }

    /// Returns false only if the zone map proves no row satisfies `predicate`.
    pub fn match_condition(&self, predicate: &ColumnPredicate) -> bool {
        match &self.meta.zone_map {
            Some(zone_map) => predicate.match_zone_map(zone_map),
            None => true,
        }
    }

    /// The column carries a bitmap index.
    pub fn has_bitmap_index(&self) -> bool {
        self.meta.bitmap_index_page.is_some()
    }

    /// Creates an iterator positioned at row 0.
    pub fn new_iterator(&self) -> Box<dyn ColumnIterator> {
        Box::new(FileColumnIterator {
            meta: self.meta.clone(),
            file: self.file.clone(),
            num_rows: self.num_rows,
            ordinal: 0,
            page: None,
        })
    }

    /// Loads the bitmap index; `None` when the column has none.
    pub fn new_bitmap_index_iterator(&self) -> Result<Option<BitmapIndexIterator>> {
        match &self.meta.bitmap_index_page {
            Some(pointer) => {
                let body = read_page(&self.file, pointer)?;
                BitmapIndexIterator::decode(&body).map(Some)
            }
            None => Ok(None),
        }
    }
}

struct LoadedPage {
    meta: DataPageMeta,
    cells: PageCells,
}

struct FileColumnIterator {
    meta: Arc<ColumnMeta>,
    file: Arc<FileReader>,
    num_rows: u64,
    ordinal: u64,
    page: Option<LoadedPage>,
}

impl FileColumnIterator {
    fn load_page_for(&mut self, ordinal: u64) -> Result<()> {
        if let Some(page) = &self.page {
            let start = page.meta.first_ordinal;
            if ordinal >= start && ordinal < start + page.meta.num_rows as u64 {
                return Ok(());
            }
        }

        let pages = &self.meta.data_pages;
        let idx = pages.partition_point(|p| p.first_ordinal + p.num_rows as u64 <= ordinal);
        let meta = *pages.get(idx).ok_or_else(|| {
            Error::internal(format!("no data page holds ordinal {} of column {}", ordinal, self.meta.unique_id))
        })?;

        let body = read_page(&self.file, &meta.pointer)?;
        let cells: PageCells = bincode::deserialize(&body)
            .map_err(|e| Error::corruption(format!("malformed data page: {}", e)))?;
        if cells.len() != meta.num_rows as usize {
            return Err(Error::corruption(format!(
                "data page of column {} holds {} cells, footer says {}",
                self.meta.unique_id,
                cells.len(),
                meta.num_rows
            )));
        }
        self.page = Some(LoadedPage { meta, cells });
        Ok(())
    }
}

impl ColumnIterator for FileColumnIterator {
    fn seek_to_ordinal(&mut self, ordinal: u64) -> Result<()> {
        if ordinal > self.num_rows {
            return Err(Error::invalid_argument(format!(
                "seek to ordinal {} beyond {} rows",
                ordinal, self.num_rows
            )));
        }
        self.ordinal = ordinal;
        Ok(())
    }

    fn next_batch(&mut self, n: usize, dst: &mut Vec<Option<Datum>>) -> Result<usize> {
        let mut read = 0;
        while read < n && self.ordinal < self.num_rows {
            self.load_page_for(self.ordinal)?;
            let Some(page) = &self.page else { break };
            let offset = (self.ordinal - page.meta.first_ordinal) as usize;
            let take = (n - read).min(page.cells.len() - offset);
            dst.extend_from_slice(&page.cells[offset..offset + take]);
            read += take;
            self.ordinal += take as u64;
        }
        Ok(read)
    }

    fn current_ordinal(&self) -> u64 {
        self.ordinal
    }
}

/// Yields a column's default value (or null) for every row of a segment
/// written before the column existed.
#[derive(Debug, Clone)]
pub struct DefaultValueColumnIterator {
    value: Option<Datum>,
    num_rows: u64,
    ordinal: u64,
}

impl DefaultValueColumnIterator {
    /// Fails with `SchemaGap` when the column has no default and is not
    /// nullable.
    pub fn new(column: &TabletColumn, num_rows: u64) -> Result<Self> {
        let value = match column.parsed_default()? {
            Some(value) => Some(value),
            None if column.is_nullable => None,
            None => {
                return Err(Error::schema_gap(format!(
                    "column {} (unique id {}) is missing, not nullable and has no default",
                    column.name, column.unique_id
                )));
            }
        };
        Ok(Self { value, num_rows, ordinal: 0 })
    }

    /// The value every row reads.
    pub fn value(&self) -> Option<&Datum> {
        self.value.as_ref()
    }
}

impl ColumnIterator for DefaultValueColumnIterator {
    fn seek_to_ordinal(&mut self, ordinal: u64) -> Result<()> {
        self.ordinal = ordinal.min(self.num_rows);
        Ok(())
    }

    fn next_batch(&mut self, n: usize, dst: &mut Vec<Option<Datum>>) -> Result<usize> {
        let take = (n as u64).min(self.num_rows - self.ordinal) as usize;
        dst.extend(std::iter::repeat(self.value.clone()).take(take));
        self.ordinal += take as u64;
        Ok(take)
    }

    fn current_ordinal(&self) -> u64 {
        self.ordinal
    }
}

#[derive(Serialize, Deserialize)]
pub(crate) struct BitmapIndexPage {
    pub(crate) values: Vec<(Datum, Vec<u8>)>,
    pub(crate) null_bitmap: Vec<u8>,
}

impl BitmapIndexPage {
    pub(crate) fn build(values: Vec<(Datum, RoaringBitmap)>, nulls: &RoaringBitmap) -> Result<Self> {
        let mut encoded = Vec::with_capacity(values.len());
        for (value, bitmap) in values {
            let mut bytes = Vec::with_capacity(bitmap.serialized_size());
            bitmap.serialize_into(&mut bytes)?;
            encoded.push((value, bytes));
        }
        let mut null_bitmap = Vec::with_capacity(nulls.serialized_size());
        nulls.serialize_into(&mut null_bitmap)?;
        Ok(Self { values: encoded, null_bitmap })
    }
}

/// Dictionary of distinct values, each with the bitmap of rows holding it.
#[derive(Debug, Clone)]
pub struct BitmapIndexIterator {
    values: Vec<Datum>,
    bitmaps: Vec<RoaringBitmap>,
    null_bitmap: RoaringBitmap,
    current: usize,
}

impl BitmapIndexIterator {
    fn decode(body: &[u8]) -> Result<Self> {
        let page: BitmapIndexPage = bincode::deserialize(body)
            .map_err(|e| Error::corruption(format!("malformed bitmap index: {}", e)))?;
        let deserialize = |bytes: &[u8]| {
            RoaringBitmap::deserialize_from(bytes)
                .map_err(|e| Error::corruption(format!("malformed bitmap: {}", e)))
        };

        let mut values = Vec::with_capacity(page.values.len());
        let mut bitmaps = Vec::with_capacity(page.values.len());
        for (value, bytes) in &page.values {
            values.push(value.clone());
            bitmaps.push(deserialize(bytes)?);
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::corruption("bitmap index dictionary is not sorted"));
        }
        let null_bitmap = deserialize(&page.null_bitmap)?;
        Ok(Self { values, bitmaps, null_bitmap, current: 0 })
    }

    /// Number of distinct values.
    pub fn bitmap_nums(&self) -> usize {
        self.values.len()
    }

    /// Positions at the first dictionary entry not less than `value` and
    /// reports whether it is an exact match.
    pub fn seek_dictionary(&mut self, value: &Datum) -> bool {
        self.current = self.values.partition_point(|v| v < value);
        self.values.get(self.current) == Some(value)
    }

    /// Current dictionary position.
    pub fn current_ordinal(&self) -> usize {
        self.current
    }

    /// Dictionary value at `ordinal`.
    pub fn value(&self, ordinal: usize) -> Option<&Datum> {
        self.values.get(ordinal)
    }

    /// Rows holding the value at `ordinal`.
    pub fn read_bitmap(&self, ordinal: usize) -> Result<&RoaringBitmap> {
        self.bitmaps.get(ordinal).ok_or_else(|| {
            Error::invalid_argument(format!(
                "bitmap ordinal {} out of range ({} entries)",
                ordinal,
                self.bitmaps.len()
            ))
        })
    }

    /// Union of the bitmaps at ordinals `from..to`.
    pub fn read_union_bitmap(&self, from: usize, to: usize) -> RoaringBitmap {
        let to = to.min(self.bitmaps.len());
        let mut result = RoaringBitmap::new();
        for bitmap in self.bitmaps.get(from..to).unwrap_or_default() {
            result |= bitmap;
        }
        result
    }

    /// Some row is null.
    pub fn has_null_bitmap(&self) -> bool {
        !self.null_bitmap.is_empty()
    }

    /// Rows holding null.
    pub fn read_null_bitmap(&self) -> &RoaringBitmap {
        &self.null_bitmap
    }
}
