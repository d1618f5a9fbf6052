//! Segment builder.
//!
//! Rows are appended in key order and buffered column by column; `finish`
//! writes the data pages, bitmap indexes, short-key index, footer and trailer.

use super::column_reader::BitmapIndexPage;
use super::footer::{ColumnMeta, DataPageMeta, SegmentFooter, Trailer, ZoneMap};
use super::page::{encode_page, PagePointer};
use super::short_key_index::{KeyTuple, ShortKeyIndex};
use super::{DEFAULT_ROWS_PER_PAGE, FORMAT_VERSION};
use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::schema::TabletSchema;
use crate::types::Datum;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes one segment file.
///
/// Usage:
/// ```no_run
/// use segstore::schema::{TabletColumn, TabletSchema};
/// use segstore::segment::SegmentBuilder;
/// use segstore::types::{Datum, PrimitiveType};
/// use std::sync::Arc;
///
/// let schema = Arc::new(
///     TabletSchema::new(vec![TabletColumn::new(1, "k", PrimitiveType::Int).key()], 1).unwrap(),
/// );
/// let mut builder = SegmentBuilder::new("0.seg", schema).unwrap();
/// builder.append_row(&[Some(Datum::Int(1))]).unwrap();
/// builder.finish().unwrap();
/// ```
pub struct SegmentBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    tablet_schema: Arc<TabletSchema>,
    columns: Vec<Vec<Option<Datum>>>,
    zone_maps: Vec<ZoneMap>,
    short_keys: Vec<KeyTuple>,
    last_key: Option<KeyTuple>,
    num_rows: u64,
    rows_per_page: usize,
    compression: CompressionType,
    offset: u64,
}

impl SegmentBuilder {
    /// Creates the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P, tablet_schema: Arc<TabletSchema>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        let num_columns = tablet_schema.num_columns();
        Ok(Self {
            path,
            writer,
            tablet_schema,
            columns: vec![Vec::new(); num_columns],
            zone_maps: vec![ZoneMap::default(); num_columns],
            short_keys: Vec::new(),
            last_key: None,
            num_rows: 0,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            compression: CompressionType::default(),
            offset: 0,
        })
    }

    /// Set the page compression
    pub fn set_compression(&mut self, compression: CompressionType) {
        self.compression = compression;
    }

    /// Set the number of rows per data page (default: 1024)
    pub fn set_rows_per_page(&mut self, rows: usize) {
        self.rows_per_page = rows.max(1);
    }

    /// Appends one row, a cell per schema column.
    ///
    /// Rows must arrive in non-decreasing key order.
    pub fn append_row(&mut self, cells: &[Option<Datum>]) -> Result<()> {
        let schema = self.tablet_schema.clone();
        if cells.len() != schema.num_columns() {
            return Err(Error::invalid_argument(format!(
                "row has {} cells, schema has {} columns",
                cells.len(),
                schema.num_columns()
            )));
        }
        for (cell, column) in cells.iter().zip(schema.columns()) {
            match cell {
                None if !column.is_nullable => {
                    return Err(Error::invalid_argument(format!(
                        "null in non-nullable column {}",
                        column.name
                    )));
                }
                Some(value) if !value.is_compatible(column.field_type) => {
                    return Err(Error::invalid_argument(format!(
                        "value {} does not fit column {} of type {}",
                        value, column.name, column.field_type
                    )));
                }
                _ => {}
            }
        }

        let key = &cells[..schema.num_key_columns()];
        if let Some(last) = &self.last_key {
            if key < last.as_slice() {
                return Err(Error::invalid_argument("Rows must be appended in key order"));
            }
        }
        self.last_key = Some(key.to_vec());

        if self.num_rows % schema.num_rows_per_block() as u64 == 0 {
            self.short_keys.push(cells[..schema.num_short_key_columns()].to_vec());
        }

        for ((column, zone_map), cell) in self.columns.iter_mut().zip(&mut self.zone_maps).zip(cells) {
            zone_map.update(cell.as_ref());
            column.push(cell.clone());
        }
        self.num_rows += 1;
        Ok(())
    }

    /// Rows appended so far.
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    fn write_page(&mut self, body: &[u8], compression: CompressionType) -> Result<PagePointer> {
        let page = encode_page(body, compression)?;
        self.writer.write_all(&page)?;
        let pointer = PagePointer::new(self.offset, page.len() as u32);
        self.offset += page.len() as u64;
        Ok(pointer)
    }

    fn write_column(&mut self, ordinal: usize) -> Result<ColumnMeta> {
        let column = self.tablet_schema.columns()[ordinal].clone();
        let cells = std::mem::take(&mut self.columns[ordinal]);

        let mut data_pages = Vec::with_capacity(cells.len().div_ceil(self.rows_per_page));
        let mut first_ordinal = 0u64;
        for chunk in cells.chunks(self.rows_per_page) {
            let body = bincode::serialize(chunk)?;
            let pointer = self.write_page(&body, self.compression)?;
            data_pages.push(DataPageMeta { pointer, first_ordinal, num_rows: chunk.len() as u32 });
            first_ordinal += chunk.len() as u64;
        }

        let bitmap_index_page = if column.has_bitmap_index {
            let mut values: BTreeMap<&Datum, RoaringBitmap> = BTreeMap::new();
            let mut nulls = RoaringBitmap::new();
            for (row, cell) in cells.iter().enumerate() {
                match cell {
                    Some(value) => {
                        values.entry(value).or_default().insert(row as u32);
                    }
                    None => {
                        nulls.insert(row as u32);
                    }
                }
            }
            let page = BitmapIndexPage::build(
                values.into_iter().map(|(v, b)| (v.clone(), b)).collect(),
                &nulls,
            )?;
            let body = bincode::serialize(&page)?;
            Some(self.write_page(&body, self.compression)?)
        } else {
            None
        };

        Ok(ColumnMeta {
            ordinal: ordinal as u32,
            unique_id: column.unique_id,
            field_type: column.field_type,
            is_nullable: column.is_nullable,
            data_pages,
            zone_map: Some(std::mem::take(&mut self.zone_maps[ordinal])),
            bitmap_index_page,
        })
    }

    /// Writes the segment and returns its footer.
    pub fn finish(mut self) -> Result<SegmentFooter> {
        if self.num_rows > u32::MAX as u64 {
            return Err(Error::invalid_state(format!(
                "segment with {} rows exceeds row id space",
                self.num_rows
            )));
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for ordinal in 0..self.columns.len() {
            columns.push(self.write_column(ordinal)?);
        }

        let index_body = ShortKeyIndex::encode_keys(&self.short_keys)?;
        let short_key_index_page = self.write_page(&index_body, CompressionType::None)?;

        let footer = SegmentFooter {
            version: FORMAT_VERSION,
            num_rows: self.num_rows,
            columns,
            short_key_index_page,
            num_short_key_columns: self.tablet_schema.num_short_key_columns() as u32,
            num_rows_per_block: self.tablet_schema.num_rows_per_block() as u32,
        };
        let footer_body = footer.encode()?;
        self.writer.write_all(&footer_body)?;

        let trailer = Trailer {
            footer_len: footer_body.len() as u32,
            footer_checksum: crc32c::crc32c(&footer_body),
        };
        self.writer.write_all(&trailer.encode())?;
        self.writer.flush()?;

        log::debug!(
            "wrote segment {}: {} rows, {} short key entries",
            self.path.display(),
            self.num_rows,
            self.short_keys.len()
        );
        Ok(footer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TabletColumn;
    use crate::segment::Segment;
    use crate::types::PrimitiveType;
    use tempfile::TempDir;

    fn schema() -> Arc<TabletSchema> {
        Arc::new(
            TabletSchema::new(
                vec![
                    TabletColumn::new(1, "k", PrimitiveType::Int).key(),
                    TabletColumn::new(2, "tag", PrimitiveType::Varchar).bitmap_index(),
                ],
                1,
            )
            .unwrap()
            .with_num_rows_per_block(4)
            .unwrap(),
        )
    }

    #[test]
    fn test_rejects_out_of_order_keys() {
        let dir = TempDir::new().unwrap();
        let mut builder = SegmentBuilder::new(dir.path().join("0.seg"), schema()).unwrap();
        builder.append_row(&[Some(Datum::Int(5)), None]).unwrap();
        builder.append_row(&[Some(Datum::Int(5)), None]).unwrap();
        assert!(builder.append_row(&[Some(Datum::Int(4)), None]).is_err());
        assert_eq!(builder.num_rows(), 2);
    }

    #[test]
    fn test_rejects_bad_cells() {
        let dir = TempDir::new().unwrap();
        let mut builder = SegmentBuilder::new(dir.path().join("0.seg"), schema()).unwrap();
        assert!(builder.append_row(&[Some(Datum::Int(1))]).is_err());
        assert!(builder.append_row(&[None, None]).is_err());
        assert!(builder.append_row(&[Some(Datum::from("x")), None]).is_err());
        assert_eq!(builder.num_rows(), 0);
    }

    #[test]
    fn test_finish_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.seg");
        let mut builder = SegmentBuilder::new(&path, schema()).unwrap();
        builder.set_rows_per_page(3);
        for k in 0..10 {
            let tag = if k % 2 == 0 { Some(Datum::from("even")) } else { None };
            builder.append_row(&[Some(Datum::Int(k)), tag]).unwrap();
        }
        let footer = builder.finish().unwrap();

        assert_eq!(footer.num_rows, 10);
        assert_eq!(footer.columns[0].data_pages.len(), 4);
        assert_eq!(footer.columns[0].data_pages[3].first_ordinal, 9);
        let zone_map = footer.columns[0].zone_map.as_ref().unwrap();
        assert_eq!(zone_map.min, Some(Datum::Int(0)));
        assert_eq!(zone_map.max, Some(Datum::Int(9)));
        assert!(footer.columns[1].bitmap_index_page.is_some());

        let segment = Segment::open(&path, 0, schema()).unwrap();
        let index = segment.load_index().unwrap();
        assert_eq!(index.num_blocks(), 3);
        assert_eq!(index.key(2), &[Some(Datum::Int(8))]);

        let mut bitmap = segment.new_bitmap_index_iterator(1).unwrap().unwrap();
        assert!(bitmap.seek_dictionary(&Datum::from("even")));
        assert_eq!(bitmap.read_bitmap(0).unwrap().len(), 5);
        assert_eq!(bitmap.read_null_bitmap().len(), 5);
    }

    #[test]
    fn test_empty_segment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.seg");
        let footer = SegmentBuilder::new(&path, schema()).unwrap().finish().unwrap();
        assert_eq!(footer.num_rows, 0);

        let segment = Segment::open(&path, 0, schema()).unwrap();
        assert_eq!(segment.load_index().unwrap().num_blocks(), 0);
    }
}
