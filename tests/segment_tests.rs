// Segment Read Path Tests for SegStore
// These tests write segments with the builder and read them back through
// the full open / prune / iterate path

use segstore::predicate::{ColumnPredicate, CompareOp};
use segstore::range::{build_key_ranges, OlapScanKeys};
use segstore::schema::{Schema, TabletColumn, TabletSchema};
use segstore::segment::{ReadOptions, ReaderStatistics, RowwiseIterator, Segment, SegmentBuilder, TRAILER_SIZE};
use segstore::types::{Datum, PrimitiveType, F64};
use segstore::{BitmapKey, DeleteBitmap, Error, ScanOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn tablet_schema() -> Arc<TabletSchema> {
    Arc::new(
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "k1", PrimitiveType::Int).key(),
                TabletColumn::new(2, "k2", PrimitiveType::Varchar).key(),
                TabletColumn::new(3, "v", PrimitiveType::BigInt),
                TabletColumn::new(4, "tag", PrimitiveType::Varchar).bitmap_index(),
            ],
            2,
        )
        .unwrap()
        .with_num_rows_per_block(8)
        .unwrap(),
    )
}

/// Writes rows `(k1, k2)` for k1 in 0..20 and k2 in a, b, c; `v = k1`,
/// `tag` is "hot" when k1 is divisible by 5 and null otherwise.
fn write_grid(path: &Path) {
    let mut builder = SegmentBuilder::new(path, tablet_schema()).unwrap();
    builder.set_rows_per_page(7);
    for k1 in 0..20 {
        for k2 in ["a", "b", "c"] {
            let tag = if k1 % 5 == 0 { Some(Datum::from("hot")) } else { None };
            builder
                .append_row(&[Some(Datum::Int(k1)), Some(Datum::from(k2)), Some(Datum::BigInt(k1 as i64)), tag])
                .unwrap();
        }
    }
    builder.finish().unwrap();
}

fn open_grid(dir: &TempDir) -> Arc<Segment> {
    let path = dir.path().join("grid.seg");
    write_grid(&path);
    Segment::open(&path, 1, tablet_schema()).unwrap()
}

fn keys_of(rows: &[segstore::segment::Row]) -> Vec<(i32, String)> {
    rows.iter()
        .map(|row| match (row.cell(0), row.cell(1)) {
            (Some(Datum::Int(k1)), Some(k2)) => (*k1, k2.to_string()),
            other => panic!("unexpected key cells {:?}", other),
        })
        .collect()
}

/// Test reading every row back
#[test]
fn test_full_scan() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);

    let schema = Schema::all(tablet_schema());
    let mut iter = segment.new_iterator(&schema, ReadOptions::default().batch_size(16)).unwrap();
    let rows = iter.read_all().unwrap();

    assert_eq!(rows.len(), 60);
    assert_eq!(rows[0].row_id, 0);
    assert_eq!(rows[59].row_id, 59);
    assert_eq!(keys_of(&rows)[4], (1, "b".to_string()));
    assert_eq!(rows[15].cell(3), Some(&Datum::from("hot")));
    assert_eq!(rows[18].cell(3), None);
}

/// Test that any flipped footer bit or checksum bit is reported as corruption
#[test]
fn test_footer_tamper_detection() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.seg");
    write_grid(&path);

    let original = std::fs::read(&path).unwrap();
    let segment = Segment::open(&path, 1, tablet_schema()).unwrap();

    // A byte-identical copy opens with the same statistics
    let copy_path = dir.path().join("copy.seg");
    std::fs::write(&copy_path, &original).unwrap();
    let copy = Segment::open(&copy_path, 1, tablet_schema()).unwrap();
    assert_eq!(copy.num_rows(), segment.num_rows());
    assert_eq!(copy.footer(), segment.footer());

    let len = original.len();
    let footer_len =
        u32::from_le_bytes(original[len - TRAILER_SIZE..len - TRAILER_SIZE + 4].try_into().unwrap()) as usize;
    let footer_start = len - TRAILER_SIZE - footer_len;

    let tampered_path = dir.path().join("tampered.seg");
    let check = |position: usize, bit: u8| {
        let mut data = original.clone();
        data[position] ^= 1 << bit;
        std::fs::write(&tampered_path, &data).unwrap();
        let err = Segment::open(&tampered_path, 1, tablet_schema()).unwrap_err();
        assert!(err.is_corruption(), "byte {} bit {}: {}", position, bit, err);
    };

    for position in footer_start..len - TRAILER_SIZE {
        check(position, (position % 8) as u8);
    }
    for position in len - 8..len - 4 {
        for bit in 0..8 {
            check(position, bit);
        }
    }
}

/// Test zone-map pruning of a whole segment
#[test]
fn test_zone_map_pruning() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zone.seg");
    let mut builder = SegmentBuilder::new(&path, tablet_schema()).unwrap();
    for (i, v) in (10..=20).enumerate() {
        builder
            .append_row(&[Some(Datum::Int(i as i32)), Some(Datum::from("a")), Some(Datum::BigInt(v)), None])
            .unwrap();
    }
    builder.finish().unwrap();
    let segment = Segment::open(&path, 3, tablet_schema()).unwrap();
    let schema = Schema::all(tablet_schema());
    let stats = Arc::new(ReaderStatistics::new());

    let pruned = ReadOptions::default()
        .stats(stats.clone())
        .predicate(ColumnPredicate::compare(2, CompareOp::Gt, Datum::BigInt(25)));
    let rows = segment.new_iterator(&schema, pruned).unwrap().read_all().unwrap();
    assert!(rows.is_empty());
    assert_eq!(ReaderStatistics::get(&stats.filtered_segment_number), 1);
    assert_eq!(ReaderStatistics::get(&stats.raw_rows_read), 0);
    assert_eq!(segment.index_load_count(), 0);

    let kept = ReadOptions::default()
        .stats(stats.clone())
        .predicate(ColumnPredicate::compare(2, CompareOp::Gt, Datum::BigInt(15)));
    let rows = segment.new_iterator(&schema, kept).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| matches!(r.cell(2), Some(Datum::BigInt(v)) if *v > 15)));
    assert_eq!(ReaderStatistics::get(&stats.filtered_segment_number), 1);
    assert_eq!(ReaderStatistics::get(&stats.total_segment_number), 2);
    assert_eq!(ReaderStatistics::get(&stats.rows_conditions_filtered), 6);
}

/// Test pruning can be switched off
#[test]
fn test_zone_map_pruning_disabled() {
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let schema = Schema::all(tablet_schema());

    let mut opts = ReadOptions::default().predicate(ColumnPredicate::compare(2, CompareOp::Gt, Datum::BigInt(100)));
    opts.enable_zone_map_pruning = false;
    let stats = opts.stats.clone();
    let rows = segment.new_iterator(&schema, opts).unwrap().read_all().unwrap();
    assert!(rows.is_empty());
    assert_eq!(ReaderStatistics::get(&stats.filtered_segment_number), 0);
    assert_eq!(ReaderStatistics::get(&stats.raw_rows_read), 60);
}

/// Test compiled scan keys drive the short-key index and exact key checks
#[test]
fn test_scan_keys_select_rows() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let tablet_schema = tablet_schema();

    let predicates = vec![
        ColumnPredicate::in_list(0, vec![Datum::Int(3), Datum::Int(5)]),
        ColumnPredicate::compare(1, CompareOp::Eq, "b"),
    ];
    let options = ScanOptions::default();
    let mut ranges = build_key_ranges(&tablet_schema, &predicates).unwrap();
    let mut scan_keys = OlapScanKeys::new();
    assert!(scan_keys.compile(&mut ranges, &options));
    assert_eq!(scan_keys.size(), 2);

    let opts = ReadOptions::from_scan_options(&options).scan_keys(&scan_keys, &tablet_schema).unwrap();
    let stats = opts.stats.clone();
    let rows = segment.new_iterator(&Schema::all(tablet_schema), opts).unwrap().read_all().unwrap();

    assert_eq!(keys_of(&rows), vec![(3, "b".to_string()), (5, "b".to_string())]);
    let filtered = ReaderStatistics::get(&stats.rows_key_range_filtered);
    assert!(filtered >= 58, "filtered {}", filtered);
    assert!(ReaderStatistics::get(&stats.raw_rows_read) < 60);
}

/// Test an interval key range over the leading key column
#[test]
fn test_interval_scan_keys() {
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let tablet_schema = tablet_schema();

    let predicates = vec![
        ColumnPredicate::compare(0, CompareOp::Ge, 5),
        ColumnPredicate::compare(0, CompareOp::Lt, 8),
    ];
    let options = ScanOptions::default();
    let mut ranges = build_key_ranges(&tablet_schema, &predicates).unwrap();
    let mut scan_keys = OlapScanKeys::new();
    scan_keys.compile(&mut ranges, &options);

    let opts = ReadOptions::from_scan_options(&options).scan_keys(&scan_keys, &tablet_schema).unwrap();
    let rows = segment.new_iterator(&Schema::all(tablet_schema), opts).unwrap().read_all().unwrap();
    let keys = keys_of(&rows);
    assert_eq!(keys.len(), 9);
    assert!(keys.iter().all(|(k1, _)| (5..8).contains(k1)));
}

/// Test an unsatisfiable key set reads nothing
#[test]
fn test_unsatisfiable_scan_keys() {
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let tablet_schema = tablet_schema();

    let predicates = vec![
        ColumnPredicate::compare(0, CompareOp::Gt, 10),
        ColumnPredicate::compare(0, CompareOp::Lt, 5),
    ];
    let options = ScanOptions::default();
    let mut ranges = build_key_ranges(&tablet_schema, &predicates).unwrap();
    let mut scan_keys = OlapScanKeys::new();
    scan_keys.compile(&mut ranges, &options);
    assert!(scan_keys.is_unsatisfiable());

    let opts = ReadOptions::from_scan_options(&options).scan_keys(&scan_keys, &tablet_schema).unwrap();
    let rows = segment.new_iterator(&Schema::all(tablet_schema), opts).unwrap().read_all().unwrap();
    assert!(rows.is_empty());
}

/// Test the delete bitmap hides rows
#[test]
fn test_delete_bitmap_hides_rows() {
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);

    let delete_bitmap = DeleteBitmap::new();
    let key = BitmapKey::new(42, segment.id(), 3);
    for row in [0, 1, 2, 30] {
        delete_bitmap.add(key, row);
    }
    let deleted = Arc::new(delete_bitmap.get(key).unwrap());

    let opts = ReadOptions::default().delete_bitmap(deleted);
    let stats = opts.stats.clone();
    let rows = segment.new_iterator(&Schema::all(tablet_schema()), opts).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 56);
    assert_eq!(rows[0].row_id, 3);
    assert!(rows.iter().all(|r| r.row_id != 30));
    assert_eq!(ReaderStatistics::get(&stats.rows_del_filtered), 4);
}

/// Test bitmap indexes answer equality and null predicates
#[test]
fn test_bitmap_index_predicates() {
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let schema = Schema::project(tablet_schema(), vec![0, 3]).unwrap();

    let opts = ReadOptions::default().predicate(ColumnPredicate::compare(3, CompareOp::Eq, "hot"));
    let stats = opts.stats.clone();
    let rows = segment.new_iterator(&schema, opts).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 12);
    assert!(rows.iter().all(|r| r.cells.len() == 2 && r.cell(1) == Some(&Datum::from("hot"))));
    assert_eq!(ReaderStatistics::get(&stats.rows_conditions_filtered), 48);
    assert_eq!(ReaderStatistics::get(&stats.raw_rows_read), 12);

    let opts = ReadOptions::default().predicate(ColumnPredicate::is_null(3));
    let rows = segment.new_iterator(&schema, opts).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 48);

    let mut index = segment.new_bitmap_index_iterator(3).unwrap().unwrap();
    assert_eq!(index.bitmap_nums(), 1);
    assert!(!index.seek_dictionary(&Datum::from("cold")));
    assert!(segment.new_bitmap_index_iterator(2).unwrap().is_none());
}

fn write_v1(path: &Path) {
    let v1 = Arc::new(
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "k", PrimitiveType::Int).key(),
                TabletColumn::new(2, "v", PrimitiveType::BigInt),
            ],
            1,
        )
        .unwrap(),
    );
    let mut builder = SegmentBuilder::new(path, v1).unwrap();
    for k in 0..4 {
        builder.append_row(&[Some(Datum::Int(k)), Some(Datum::BigInt(k as i64 * 10))]).unwrap();
    }
    builder.finish().unwrap();
}

fn evolved_schema(extra: TabletColumn) -> Arc<TabletSchema> {
    Arc::new(
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "k", PrimitiveType::Int).key(),
                TabletColumn::new(2, "v", PrimitiveType::BigInt),
                TabletColumn::new(5, "note", PrimitiveType::Varchar),
                extra,
            ],
            1,
        )
        .unwrap(),
    )
}

/// Test columns added after a segment was written read as defaults
#[test]
fn test_schema_evolution_defaults() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("v1.seg");
    write_v1(&path);

    let v2 = evolved_schema(TabletColumn::new(6, "added", PrimitiveType::Int).nullable(false).default_value("7"));
    let segment = Segment::open(&path, 0, v2.clone()).unwrap();
    assert!(segment.column_reader(2).is_none());

    let rows = segment.new_iterator(&Schema::all(v2.clone()), ReadOptions::default()).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.cell(2), None);
        assert_eq!(row.cell(3), Some(&Datum::Int(7)));
    }

    // A predicate the default cannot satisfy prunes the segment
    let opts = ReadOptions::default().predicate(ColumnPredicate::compare(3, CompareOp::Eq, 8));
    let stats = opts.stats.clone();
    let rows = segment.new_iterator(&Schema::all(v2), opts).unwrap().read_all().unwrap();
    assert!(rows.is_empty());
    assert_eq!(ReaderStatistics::get(&stats.filtered_segment_number), 1);
}

/// Test a missing non-nullable column without default fails its read
#[test]
fn test_schema_gap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v1.seg");
    write_v1(&path);

    let v3 = evolved_schema(TabletColumn::new(6, "strict", PrimitiveType::Int).nullable(false));
    let segment = Segment::open(&path, 0, v3.clone()).unwrap();
    assert!(matches!(segment.new_column_iterator(3), Err(Error::SchemaGap(_))));

    // Reads that skip the column are unaffected
    let projected = Schema::project(v3.clone(), vec![0, 1]).unwrap();
    let rows = segment.new_iterator(&projected, ReadOptions::default()).unwrap().read_all().unwrap();
    assert_eq!(rows.len(), 4);

    let mut iter = segment.new_iterator(&Schema::all(v3), ReadOptions::default()).unwrap();
    assert!(matches!(iter.read_all(), Err(Error::SchemaGap(_))));
}

/// Test racing first readers parse the short-key index once
#[test]
fn test_concurrent_index_load() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let segment = open_grid(&dir);
    let stats = Arc::new(ReaderStatistics::new());

    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));
    let mut handles = vec![];

    for _ in 0..num_threads {
        let segment = Arc::clone(&segment);
        let barrier = Arc::clone(&barrier);
        let stats = Arc::clone(&stats);
        let handle = thread::spawn(move || {
            barrier.wait();
            let schema = Schema::all(tablet_schema());
            let opts = ReadOptions::default().stats(stats);
            segment.new_iterator(&schema, opts).unwrap().read_all().unwrap().len()
        });
        handles.push(handle);
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 60);
    }
    assert_eq!(segment.index_load_count(), 1);
    assert_eq!(ReaderStatistics::get(&stats.short_key_index_loads), 1);
    assert_eq!(ReaderStatistics::get(&stats.total_segment_number), num_threads as u64);
    assert!(segment.short_key_index().is_some());
}

/// Test a corrupt short-key index page fails every reader the same way
#[test]
fn test_index_load_failure_is_shared() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.seg");
    write_grid(&path);

    let segment = Segment::open(&path, 1, tablet_schema()).unwrap();
    let pointer = segment.footer().short_key_index_page;
    drop(segment);

    let mut data = std::fs::read(&path).unwrap();
    data[pointer.offset as usize] ^= 0xff;
    std::fs::write(&path, &data).unwrap();

    let segment = Segment::open(&path, 1, tablet_schema()).unwrap();
    let schema = Schema::all(tablet_schema());
    let first = segment.new_iterator(&schema, ReadOptions::default()).err().unwrap();
    let second = segment.new_iterator(&schema, ReadOptions::default()).err().unwrap();
    assert!(first.is_corruption());
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(segment.index_load_count(), 1);
}

/// Test scan keys over a DOUBLE key column keep non-finite keys
#[test]
fn test_double_key_scan_keeps_infinities() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("double.seg");
    let tablet_schema = Arc::new(
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "d", PrimitiveType::Double).key(),
                TabletColumn::new(2, "v", PrimitiveType::Int),
            ],
            1,
        )
        .unwrap()
        .with_num_rows_per_block(2)
        .unwrap(),
    );
    let keys = [f64::NEG_INFINITY, -1.0, -0.0, 0.0, 1.0, f64::INFINITY];
    let mut builder = SegmentBuilder::new(&path, tablet_schema.clone()).unwrap();
    for (i, k) in keys.iter().enumerate() {
        builder.append_row(&[Some(Datum::Double(F64(*k))), Some(Datum::Int(i as i32))]).unwrap();
    }
    builder.finish().unwrap();
    let segment = Segment::open(&path, 3, tablet_schema.clone()).unwrap();

    let scan = |predicates: Vec<ColumnPredicate>| -> Vec<i32> {
        let options = ScanOptions::default();
        let mut ranges = build_key_ranges(&tablet_schema, &predicates).unwrap();
        let mut scan_keys = OlapScanKeys::new();
        scan_keys.compile(&mut ranges, &options);
        let opts = ReadOptions::from_scan_options(&options).scan_keys(&scan_keys, &tablet_schema).unwrap();
        let mut iter = segment.new_iterator(&Schema::all(tablet_schema.clone()), opts).unwrap();
        iter.read_all()
            .unwrap()
            .iter()
            .map(|row| match row.cell(1) {
                Some(Datum::Int(v)) => *v,
                other => panic!("unexpected cell {:?}", other),
            })
            .collect()
    };

    assert_eq!(scan(vec![ColumnPredicate::compare(0, CompareOp::Lt, Datum::Double(F64(-0.0)))]), vec![0, 1]);
    assert_eq!(scan(vec![ColumnPredicate::compare(0, CompareOp::Gt, Datum::Double(F64(0.0)))]), vec![4, 5]);
    assert_eq!(scan(vec![ColumnPredicate::is_not_null(0)]), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(scan(vec![]), vec![0, 1, 2, 3, 4, 5]);
}
