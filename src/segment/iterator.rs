//! Row iteration over one segment.

use super::column_reader::ColumnIterator;
use super::reader::Segment;
use super::short_key_index::{compare_key_prefix, KeyTuple, ShortKeyIndex};
use crate::config::ScanOptions;
use crate::error::{Error, Result};
use crate::predicate::{ColumnPredicate, CompareOp, PredicateKind};
use crate::range::{OlapScanKeys, OlapScanRange};
use crate::schema::{Schema, TabletSchema};
use crate::types::{Datum, RangeValue, StringValue};
use roaring::RoaringBitmap;
use std::cmp::Ordering as KeyOrdering;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by every iterator of one scan.
#[derive(Debug, Default)]
pub struct ReaderStatistics {
    /// Segments an iterator was requested for.
    pub total_segment_number: AtomicU64,
    /// Segments skipped by zone-map pruning.
    pub filtered_segment_number: AtomicU64,
    /// Rows whose cells were read.
    pub raw_rows_read: AtomicU64,
    /// Rows outside every key range.
    pub rows_key_range_filtered: AtomicU64,
    /// Rows rejected by a predicate.
    pub rows_conditions_filtered: AtomicU64,
    /// Rows removed by the delete bitmap.
    pub rows_del_filtered: AtomicU64,
    /// Short-key index pages parsed.
    pub short_key_index_loads: AtomicU64,
}

impl ReaderStatistics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Reads a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// One key range in typed form, as the segment seek path consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKeyRange {
    /// Lower key; empty means unbounded.
    pub lower: KeyTuple,
    /// Upper key; empty means unbounded.
    pub upper: KeyTuple,
    /// Lower key is inclusive.
    pub include_lower: bool,
    /// Upper key is inclusive.
    pub include_upper: bool,
}

impl RowKeyRange {
    /// Creates a range.
    pub fn new(lower: KeyTuple, upper: KeyTuple, include_lower: bool, include_upper: bool) -> Self {
        Self { lower, upper, include_lower, include_upper }
    }

    /// Parses a compiled scan range against the key columns of `schema`.
    pub fn from_scan_range(range: &OlapScanRange, schema: &TabletSchema) -> Result<Self> {
        let parse = |tuple: &crate::range::ScanTuple| -> Result<KeyTuple> {
            if tuple.size() > schema.num_key_columns() {
                return Err(Error::invalid_argument(format!(
                    "scan key has {} columns, schema has {} key columns",
                    tuple.size(),
                    schema.num_key_columns()
                )));
            }
            tuple
                .iter()
                .zip(schema.columns())
                .map(|((text, is_null), column)| {
                    if is_null {
                        return Ok(None);
                    }
                    if column.field_type.is_string_type()
                        && text == StringValue::type_max().to_scan_string()
                    {
                        return Ok(Some(Datum::String(StringValue::type_max())));
                    }
                    Datum::parse(column.field_type, text).map(Some)
                })
                .collect()
        };
        Ok(Self {
            lower: parse(&range.begin_scan_range)?,
            upper: parse(&range.end_scan_range)?,
            include_lower: range.begin_include,
            include_upper: range.end_include,
        })
    }

    /// Whether a row with key columns `key` lies in the range.
    pub fn contains(&self, key: &[Option<Datum>]) -> bool {
        if !self.lower.is_empty() {
            match compare_key_prefix(key, &self.lower) {
                KeyOrdering::Less => return false,
                KeyOrdering::Equal if !self.include_lower => return false,
                _ => {}
            }
        }
        if !self.upper.is_empty() {
            match compare_key_prefix(key, &self.upper) {
                KeyOrdering::Greater => return false,
                KeyOrdering::Equal if !self.include_upper => return false,
                _ => {}
            }
        }
        true
    }

    fn key_len(&self) -> usize {
        self.lower.len().max(self.upper.len())
    }
}

/// Options for one segment read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Conjunctive predicates; columns are tablet schema ordinals.
    pub predicates: Vec<ColumnPredicate>,
    /// Key ranges; a row is read if it lies in any of them. Empty reads all.
    pub key_ranges: Vec<RowKeyRange>,
    /// Rows deleted as of the read version.
    pub delete_bitmap: Option<Arc<RoaringBitmap>>,
    /// Shared counters.
    pub stats: Arc<ReaderStatistics>,
    /// Rows per column read.
    pub batch_size: usize,
    /// Skip the segment when a zone map rules a predicate out.
    pub enable_zone_map_pruning: bool,
    /// Pre-filter rows with bitmap indexes where available.
    pub use_bitmap_index: bool,
    /// The key ranges admit no row at all.
    pub unsatisfiable: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::from_scan_options(&ScanOptions::default())
    }
}

impl ReadOptions {
    /// Read options carrying the relevant scan settings.
    pub fn from_scan_options(options: &ScanOptions) -> Self {
        Self {
            predicates: Vec::new(),
            key_ranges: Vec::new(),
            delete_bitmap: None,
            stats: Arc::new(ReaderStatistics::new()),
            batch_size: options.batch_size,
            enable_zone_map_pruning: options.enable_zone_map_pruning,
            use_bitmap_index: true,
            unsatisfiable: false,
        }
    }

    /// Adds a predicate.
    pub fn predicate(mut self, predicate: ColumnPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds a key range.
    pub fn key_range(mut self, range: RowKeyRange) -> Self {
        self.key_ranges.push(range);
        self
    }

    /// Adds the key ranges of compiled scan keys.
    pub fn scan_keys(mut self, keys: &OlapScanKeys, schema: &TabletSchema) -> Result<Self> {
        if keys.is_unsatisfiable() {
            self.unsatisfiable = true;
            return Ok(self);
        }
        for range in keys.get_key_range() {
            self.key_ranges.push(RowKeyRange::from_scan_range(&range, schema)?);
        }
        Ok(self)
    }

    /// Sets the deleted rows.
    pub fn delete_bitmap(mut self, deleted: Arc<RoaringBitmap>) -> Self {
        self.delete_bitmap = Some(deleted);
        self
    }

    /// Shares `stats` with this read.
    pub fn stats(mut self, stats: Arc<ReaderStatistics>) -> Self {
        self.stats = stats;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// One visible row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Ordinal within the segment.
    pub row_id: u32,
    /// Cells of the projected columns, in projection order.
    pub cells: Vec<Option<Datum>>,
}

impl Row {
    /// Cell `i` of the projection.
    pub fn cell(&self, i: usize) -> Option<&Datum> {
        self.cells.get(i).and_then(Option::as_ref)
    }
}

/// A source of rows.
pub trait RowwiseIterator: Send {
    /// The projection rows follow.
    fn schema(&self) -> &Schema;

    /// Appends the next rows to `rows`; returns 0 once exhausted.
    fn next_batch(&mut self, rows: &mut Vec<Row>) -> Result<usize>;

    /// Drains the iterator.
    fn read_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while self.next_batch(&mut rows)? > 0 {}
        Ok(rows)
    }
}

/// An iterator over a segment known to hold no matching row.
#[derive(Debug)]
pub struct EmptySegmentIterator {
    schema: Schema,
}

impl EmptySegmentIterator {
    /// Creates the iterator.
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl RowwiseIterator for EmptySegmentIterator {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self, _rows: &mut Vec<Row>) -> Result<usize> {
        Ok(0)
    }
}

struct ScanState {
    candidates: roaring::bitmap::IntoIter,
    read_columns: Vec<usize>,
    column_iters: HashMap<usize, Box<dyn ColumnIterator>>,
    row_predicates: Vec<ColumnPredicate>,
    key_columns: usize,
}

/// Iterates the visible rows of one segment.
///
/// Candidate rows are narrowed, in order, by the key ranges through the
/// short-key index, by the delete bitmap and by bitmap indexes. The rest is
/// read column by column and checked row by row against the exact key ranges
/// and the remaining predicates.
pub struct SegmentIterator {
    segment: Arc<Segment>,
    schema: Schema,
    opts: ReadOptions,
    short_key_index: Arc<ShortKeyIndex>,
    state: Option<ScanState>,
}

impl SegmentIterator {
    pub(crate) fn new(
        segment: Arc<Segment>,
        schema: Schema,
        opts: ReadOptions,
        short_key_index: Arc<ShortKeyIndex>,
    ) -> Self {
        Self { segment, schema, opts, short_key_index, state: None }
    }

    fn init(&mut self) -> Result<ScanState> {
        let stats = self.opts.stats.clone();
        let num_rows = self.segment.num_rows();
        let num_rows = u32::try_from(num_rows).map_err(|_| {
            Error::invalid_state(format!("segment with {} rows exceeds row id space", num_rows))
        })?;

        let mut candidates = RoaringBitmap::new();
        candidates.insert_range(0..num_rows);

        if !self.opts.key_ranges.is_empty() {
            let mut in_ranges = RoaringBitmap::new();
            for range in &self.opts.key_ranges {
                let rows = self.short_key_index.row_range(range);
                in_ranges.insert_range(rows.start as u32..rows.end as u32);
            }
            ReaderStatistics::add(&stats.rows_key_range_filtered, candidates.len() - in_ranges.len());
            candidates = in_ranges;
        }

        if let Some(deleted) = &self.opts.delete_bitmap {
            let before = candidates.len();
            candidates -= deleted.as_ref();
            ReaderStatistics::add(&stats.rows_del_filtered, before - candidates.len());
        }

        let mut row_predicates = Vec::new();
        for predicate in &self.opts.predicates {
            match self.apply_bitmap_index(predicate)? {
                Some(matching) => {
                    let before = candidates.len();
                    candidates &= matching;
                    ReaderStatistics::add(&stats.rows_conditions_filtered, before - candidates.len());
                }
                None => row_predicates.push(predicate.clone()),
            }
        }

        let key_columns = self.opts.key_ranges.iter().map(RowKeyRange::key_len).max().unwrap_or(0);
        let read_columns: BTreeSet<usize> = self
            .schema
            .column_ids()
            .iter()
            .copied()
            .chain(row_predicates.iter().map(ColumnPredicate::column_id))
            .chain(0..key_columns)
            .collect();

        let mut column_iters = HashMap::with_capacity(read_columns.len());
        for &cid in &read_columns {
            column_iters.insert(cid, self.segment.new_column_iterator(cid)?);
        }

        log::debug!(
            "segment {} scan: {} candidate rows of {}, {} row predicates",
            self.segment.id(),
            candidates.len(),
            num_rows,
            row_predicates.len()
        );

        Ok(ScanState {
            candidates: candidates.into_iter(),
            read_columns: read_columns.into_iter().collect(),
            column_iters,
            row_predicates,
            key_columns,
        })
    }

    /// Exact row set for predicates a bitmap index can answer.
    fn apply_bitmap_index(&self, predicate: &ColumnPredicate) -> Result<Option<RoaringBitmap>> {
        if !self.opts.use_bitmap_index {
            return Ok(None);
        }
        let values: Vec<&Datum> = match predicate.kind() {
            PredicateKind::Compare(CompareOp::Eq, value) => vec![value],
            PredicateKind::InList(values) => values.iter().collect(),
            PredicateKind::IsNull => Vec::new(),
            _ => return Ok(None),
        };
        let Some(mut index) = self.segment.new_bitmap_index_iterator(predicate.column_id())? else {
            return Ok(None);
        };

        if matches!(predicate.kind(), PredicateKind::IsNull) {
            return Ok(Some(index.read_null_bitmap().clone()));
        }
        let mut matching = RoaringBitmap::new();
        for value in values {
            if index.seek_dictionary(value) {
                matching |= index.read_bitmap(index.current_ordinal())?;
            }
        }
        Ok(Some(matching))
    }
}

fn contiguous_runs(rows: &[u32]) -> Vec<(u32, usize)> {
    let mut runs: Vec<(u32, usize)> = Vec::new();
    for &row in rows {
        match runs.last_mut() {
            Some((start, len)) if *start as u64 + *len as u64 == row as u64 => *len += 1,
            _ => runs.push((row, 1)),
        }
    }
    runs
}

impl RowwiseIterator for SegmentIterator {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self, rows: &mut Vec<Row>) -> Result<usize> {
        if self.state.is_none() {
            self.state = Some(self.init()?);
        }
        let stats = self.opts.stats.clone();
        let batch_size = self.opts.batch_size.max(1);
        let Some(state) = self.state.as_mut() else {
            return Ok(0);
        };

        loop {
            let batch: Vec<u32> = state.candidates.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                return Ok(0);
            }
            ReaderStatistics::add(&stats.raw_rows_read, batch.len() as u64);

            let runs = contiguous_runs(&batch);
            let mut columns: HashMap<usize, Vec<Option<Datum>>> = HashMap::new();
            for &cid in &state.read_columns {
                let Some(iter) = state.column_iters.get_mut(&cid) else {
                    return Err(Error::internal(format!("no iterator for column {}", cid)));
                };
                let mut cells = Vec::with_capacity(batch.len());
                for &(start, len) in &runs {
                    iter.seek_to_ordinal(start as u64)?;
                    if iter.next_batch(len, &mut cells)? != len {
                        return Err(Error::corruption(format!(
                            "column {} ended early in segment {}",
                            cid,
                            self.segment.id()
                        )));
                    }
                }
                columns.insert(cid, cells);
            }

            let cell = |cid: usize, i: usize| columns.get(&cid).and_then(|c| c[i].as_ref());
            let mut produced = 0;
            for (i, &row_id) in batch.iter().enumerate() {
                if state.key_columns > 0 {
                    let key: KeyTuple = (0..state.key_columns).map(|cid| cell(cid, i).cloned()).collect();
                    if !self.opts.key_ranges.iter().any(|r| r.contains(&key)) {
                        ReaderStatistics::add(&stats.rows_key_range_filtered, 1);
                        continue;
                    }
                }
                if !state.row_predicates.iter().all(|p| p.evaluate(cell(p.column_id(), i))) {
                    ReaderStatistics::add(&stats.rows_conditions_filtered, 1);
                    continue;
                }
                let cells = self.schema.column_ids().iter().map(|&cid| cell(cid, i).cloned()).collect();
                rows.push(Row { row_id, cells });
                produced += 1;
            }

            if produced > 0 {
                return Ok(produced);
            }
        }
    }
}
