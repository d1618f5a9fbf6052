//! An opened segment.

use super::column_reader::{BitmapIndexIterator, ColumnIterator, ColumnReader, DefaultValueColumnIterator};
use super::file::FileReader;
use super::footer::{SegmentFooter, Trailer};
use super::iterator::{EmptySegmentIterator, ReadOptions, ReaderStatistics, RowwiseIterator, SegmentIterator};
use super::page::read_page;
use super::short_key_index::ShortKeyIndex;
use super::TRAILER_SIZE;
use crate::error::{Error, Result};
use crate::predicate::ColumnPredicate;
use crate::schema::{Schema, TabletSchema};
use crate::util::OnceCall;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An open, immutable segment file.
///
/// Opening reads and verifies the trailer and footer and builds a column
/// reader for every schema column present in the file. The short-key index
/// is parsed on first use, exactly once, however many iterators race for it.
pub struct Segment {
    path: PathBuf,
    segment_id: u32,
    tablet_schema: Arc<TabletSchema>,
    file: Arc<FileReader>,
    footer: SegmentFooter,
    // Indexed by tablet schema ordinal; `None` for columns added after the
    // segment was written.
    column_readers: Vec<Option<ColumnReader>>,
    short_key_index: OnceCall<ShortKeyIndex>,
    index_loads: AtomicU64,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("segment_id", &self.segment_id)
            .field("num_rows", &self.footer.num_rows)
            .field("index_loaded", &self.short_key_index.has_called())
            .finish()
    }
}

impl Segment {
    /// Opens the segment at `path`, reading it against `tablet_schema`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        segment_id: u32,
        tablet_schema: Arc<TabletSchema>,
    ) -> Result<Arc<Segment>> {
        let path = path.as_ref().to_path_buf();
        let file = Arc::new(FileReader::open(&path)?);
        let footer = Self::parse_footer(&file).inspect_err(|e| {
            log::warn!("failed to open segment {}: {}", path.display(), e);
        })?;

        let column_id_to_footer_ordinal: HashMap<u32, usize> = footer
            .columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| (column.unique_id, ordinal))
            .collect();

        let mut column_readers = Vec::with_capacity(tablet_schema.num_columns());
        for column in tablet_schema.columns() {
            let Some(&ordinal) = column_id_to_footer_ordinal.get(&column.unique_id) else {
                column_readers.push(None);
                continue;
            };
            let meta = footer.columns[ordinal].clone();
            if meta.field_type != column.field_type {
                return Err(Error::invalid_argument(format!(
                    "column {} is {} in schema but {} in segment {}",
                    column.name,
                    column.field_type,
                    meta.field_type,
                    path.display()
                )));
            }
            column_readers.push(Some(ColumnReader::new(meta, file.clone(), footer.num_rows)?));
        }

        log::debug!(
            "opened segment {} ({}): {} rows, {} of {} columns stored",
            segment_id,
            path.display(),
            footer.num_rows,
            column_readers.iter().filter(|r| r.is_some()).count(),
            column_readers.len()
        );

        Ok(Arc::new(Segment {
            path,
            segment_id,
            tablet_schema,
            file,
            footer,
            column_readers,
            short_key_index: OnceCall::new(),
            index_loads: AtomicU64::new(0),
        }))
    }

    fn parse_footer(file: &FileReader) -> Result<SegmentFooter> {
        let path = file.path().display();
        let file_size = file.size();
        if file_size < TRAILER_SIZE as u64 {
            return Err(Error::corruption(format!(
                "Bad segment file {}: file size {} < {}",
                path, file_size, TRAILER_SIZE
            )));
        }

        let trailer_bytes = file.read_at(file_size - TRAILER_SIZE as u64, TRAILER_SIZE)?;
        let trailer = Trailer::decode(&trailer_bytes)
            .map_err(|e| Error::corruption(format!("Bad segment file {}: {}", path, e)))?;

        let footer_len = trailer.footer_len as u64;
        if file_size < TRAILER_SIZE as u64 + footer_len {
            return Err(Error::corruption(format!(
                "Bad segment file {}: file size {} < {}",
                path,
                file_size,
                TRAILER_SIZE as u64 + footer_len
            )));
        }

        let footer_bytes =
            file.read_at(file_size - TRAILER_SIZE as u64 - footer_len, footer_len as usize)?;
        let actual = crc32c::crc32c(&footer_bytes);
        if actual != trailer.footer_checksum {
            return Err(Error::corruption(format!(
                "Bad segment file {}: footer checksum not match, actual={} vs expect={}",
                path, actual, trailer.footer_checksum
            )));
        }

        SegmentFooter::decode(&footer_bytes)
            .map_err(|e| Error::corruption(format!("Bad segment file {}: {}", path, e)))
    }

    /// Creates a row iterator over this segment.
    ///
    /// Returns an empty iterator without touching any data page when a zone
    /// map shows a predicate cannot hold for any row.
    pub fn new_iterator(
        self: &Arc<Self>,
        schema: &Schema,
        opts: ReadOptions,
    ) -> Result<Box<dyn RowwiseIterator>> {
        if schema.tablet_schema().as_ref() != self.tablet_schema.as_ref() {
            return Err(Error::invalid_argument(format!(
                "read schema does not match the schema segment {} was opened with",
                self.segment_id
            )));
        }
        if let Some(bad) =
            opts.predicates.iter().find(|p| p.column_id() >= self.tablet_schema.num_columns())
        {
            return Err(Error::invalid_argument(format!("predicate on unknown column: {}", bad)));
        }

        ReaderStatistics::add(&opts.stats.total_segment_number, 1);
        if opts.unsatisfiable {
            return Ok(Box::new(EmptySegmentIterator::new(schema.clone())));
        }
        if opts.enable_zone_map_pruning {
            if let Some(predicate) = opts.predicates.iter().find(|p| !self.may_match(p)) {
                ReaderStatistics::add(&opts.stats.filtered_segment_number, 1);
                log::debug!("segment {} pruned by {}", self.segment_id, predicate);
                return Ok(Box::new(EmptySegmentIterator::new(schema.clone())));
            }
        }

        let index = self.load_index_with_stats(Some(&opts.stats))?;
        Ok(Box::new(SegmentIterator::new(self.clone(), schema.clone(), opts, index)))
    }

    /// Whether some row of this segment may satisfy `predicate`.
    fn may_match(&self, predicate: &ColumnPredicate) -> bool {
        let cid = predicate.column_id();
        match self.column_readers.get(cid) {
            Some(Some(reader)) => !reader.has_zone_map() || reader.match_condition(predicate),
            // Every row of a missing column holds the default.
            Some(None) => self
                .tablet_schema
                .column(cid)
                .and_then(|c| DefaultValueColumnIterator::new(c, self.num_rows()).ok())
                .map_or(true, |it| predicate.evaluate(it.value())),
            None => true,
        }
    }

    /// Loads the short-key index, parsing it on the first call only.
    pub fn load_index(&self) -> Result<Arc<ShortKeyIndex>> {
        self.load_index_with_stats(None)
    }

    fn load_index_with_stats(&self, stats: Option<&ReaderStatistics>) -> Result<Arc<ShortKeyIndex>> {
        self.short_key_index.call(|| {
            self.index_loads.fetch_add(1, Ordering::Relaxed);
            if let Some(stats) = stats {
                ReaderStatistics::add(&stats.short_key_index_loads, 1);
            }
            let body = read_page(&self.file, &self.footer.short_key_index_page)?;
            let index = ShortKeyIndex::decode(
                &body,
                self.footer.num_rows_per_block as u64,
                self.footer.num_rows,
            )?;
            log::debug!(
                "loaded short key index of segment {}: {} blocks",
                self.segment_id,
                index.num_blocks()
            );
            Ok(index)
        })
    }

    /// The short-key index, if it has been loaded successfully.
    pub fn short_key_index(&self) -> Option<Arc<ShortKeyIndex>> {
        self.short_key_index.get()
    }

    /// Times the short-key index page was parsed.
    pub fn index_load_count(&self) -> u64 {
        self.index_loads.load(Ordering::Relaxed)
    }

    /// Iterator over column `cid`, or over its default value if the segment
    /// predates the column.
    pub fn new_column_iterator(&self, cid: usize) -> Result<Box<dyn ColumnIterator>> {
        match self.column_readers.get(cid) {
            Some(Some(reader)) => Ok(reader.new_iterator()),
            Some(None) => {
                let column = self.tablet_schema.column(cid).ok_or_else(|| {
                    Error::internal(format!("column {} missing from schema", cid))
                })?;
                Ok(Box::new(DefaultValueColumnIterator::new(column, self.num_rows())?))
            }
            None => Err(Error::invalid_argument(format!(
                "column id {} out of range for segment {}",
                cid, self.segment_id
            ))),
        }
    }

    /// Bitmap index of column `cid`, if it has one.
    pub fn new_bitmap_index_iterator(&self, cid: usize) -> Result<Option<BitmapIndexIterator>> {
        match self.column_readers.get(cid) {
            Some(Some(reader)) if reader.has_bitmap_index() => reader.new_bitmap_index_iterator(),
            Some(_) => Ok(None),
            None => Err(Error::invalid_argument(format!(
                "column id {} out of range for segment {}",
                cid, self.segment_id
            ))),
        }
    }

    /// Reader for column `cid`, if the segment stores it.
    pub fn column_reader(&self, cid: usize) -> Option<&ColumnReader> {
        self.column_readers.get(cid).and_then(Option::as_ref)
    }

    /// Row count.
    pub fn num_rows(&self) -> u64 {
        self.footer.num_rows
    }

    /// Segment id.
    pub fn id(&self) -> u32 {
        self.segment_id
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed footer.
    pub fn footer(&self) -> &SegmentFooter {
        &self.footer
    }

    /// Schema the segment was opened with.
    pub fn tablet_schema(&self) -> &Arc<TabletSchema> {
        &self.tablet_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TabletColumn;
    use crate::segment::SegmentBuilder;
    use crate::types::{Datum, PrimitiveType};
    use tempfile::TempDir;

    fn schema() -> Arc<TabletSchema> {
        Arc::new(
            TabletSchema::new(
                vec![
                    TabletColumn::new(1, "k", PrimitiveType::Int).key(),
                    TabletColumn::new(2, "v", PrimitiveType::Varchar),
                ],
                1,
            )
            .unwrap(),
        )
    }

    fn write_segment(dir: &TempDir, rows: i32) -> PathBuf {
        let path = dir.path().join("0.seg");
        let mut builder = SegmentBuilder::new(&path, schema()).unwrap();
        for k in 0..rows {
            builder.append_row(&[Some(Datum::Int(k)), Some(Datum::from("x"))]).unwrap();
        }
        builder.finish().unwrap();
        path
    }

    #[test]
    fn test_open_and_read_footer() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 10);
        let segment = Segment::open(&path, 7, schema()).unwrap();
        assert_eq!(segment.num_rows(), 10);
        assert_eq!(segment.id(), 7);
        assert_eq!(segment.footer().columns.len(), 2);
        assert!(segment.short_key_index().is_none());
        assert_eq!(segment.index_load_count(), 0);
    }

    #[test]
    fn test_open_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.seg");
        std::fs::write(&path, b"SGM1").unwrap();
        assert!(Segment::open(&path, 0, schema()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 3);
        let mut data = std::fs::read(&path).unwrap();
        let len = data.len();
        data[len - 1] = b'0';
        std::fs::write(&path, &data).unwrap();
        assert!(Segment::open(&path, 0, schema()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_open_rejects_oversized_footer_length() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 3);
        let mut data = std::fs::read(&path).unwrap();
        let len = data.len();
        data[len - TRAILER_SIZE..len - TRAILER_SIZE + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &data).unwrap();
        assert!(Segment::open(&path, 0, schema()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_load_index_once() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 5);
        let segment = Segment::open(&path, 0, schema()).unwrap();
        let first = segment.load_index().unwrap();
        let second = segment.load_index().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(segment.index_load_count(), 1);
    }

    #[test]
    fn test_column_iterator_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 2);
        let segment = Segment::open(&path, 0, schema()).unwrap();
        assert!(segment.new_column_iterator(5).is_err());
        assert!(segment.new_bitmap_index_iterator(1).unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, 2);
        let other = Arc::new(
            TabletSchema::new(
                vec![
                    TabletColumn::new(1, "k", PrimitiveType::BigInt).key(),
                    TabletColumn::new(2, "v", PrimitiveType::Varchar),
                ],
                1,
            )
            .unwrap(),
        );
        assert!(Segment::open(&path, 0, other).is_err());
    }
}
