//! Example demonstrating a filtered segment scan.
//!
//! This example shows how to:
//! - Write a small segment
//! - Compile key predicates into scan keys
//! - Read it back with a delete bitmap applied

use segstore::predicate::{ColumnPredicate, CompareOp};
use segstore::range::{build_key_ranges, OlapScanKeys};
use segstore::schema::{Schema, TabletColumn, TabletSchema};
use segstore::segment::{ReadOptions, ReaderStatistics, RowwiseIterator, Segment, SegmentBuilder};
use segstore::types::{Datum, PrimitiveType};
use segstore::{BitmapKey, DeleteBitmap, Result, ScanOptions};
use std::fs;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Segment Scan Example ===\n");

    let temp_dir = std::env::temp_dir().join("segstore_scan_example");
    fs::create_dir_all(&temp_dir)?;
    let path = temp_dir.join("orders.seg");

    let schema = Arc::new(
        TabletSchema::new(
            vec![
                TabletColumn::new(1, "region", PrimitiveType::Int).key(),
                TabletColumn::new(2, "order_id", PrimitiveType::BigInt).key(),
                TabletColumn::new(3, "status", PrimitiveType::Varchar).bitmap_index(),
            ],
            2,
        )?
        .with_num_rows_per_block(16)?,
    );

    // === Part 1: Writing ===
    println!("1. Writing a segment...");
    {
        let mut builder = SegmentBuilder::new(&path, Arc::clone(&schema))?;
        for region in 0..4 {
            for order_id in 0..50i64 {
                let status = if order_id % 7 == 0 { "open" } else { "closed" };
                builder.append_row(&[
                    Some(Datum::Int(region)),
                    Some(Datum::BigInt(order_id)),
                    Some(Datum::from(status)),
                ])?;
            }
        }
        let footer = builder.finish()?;
        println!("   {} rows written\n", footer.num_rows);
    }

    // === Part 2: Compiling scan keys ===
    println!("2. Compiling region IN (1, 2) AND order_id < 10...");
    let predicates = vec![
        ColumnPredicate::in_list(0, vec![Datum::Int(1), Datum::Int(2)]),
        ColumnPredicate::compare(1, CompareOp::Lt, Datum::BigInt(10)),
    ];
    let mut ranges = build_key_ranges(&schema, &predicates)?;
    let mut keys = OlapScanKeys::new();
    let exact = keys.compile(&mut ranges, &ScanOptions::default());
    println!("   {} (exact: {})\n", keys.debug_string(), exact);

    // === Part 3: Reading ===
    println!("3. Reading with the first row of region 1 deleted...");
    let segment = Segment::open(&path, 0, Arc::clone(&schema))?;
    let deletes = DeleteBitmap::new();
    let key = BitmapKey::new(1, 0, 1);
    deletes.add(key, 50);

    let stats = Arc::new(ReaderStatistics::new());
    let mut opts = ReadOptions::default().scan_keys(&keys, &schema)?.stats(Arc::clone(&stats));
    for predicate in predicates {
        opts = opts.predicate(predicate);
    }
    let opts = opts.predicate(ColumnPredicate::compare(2, CompareOp::Eq, Datum::from("open")));
    let opts = opts.delete_bitmap(Arc::new(deletes.get(key)?));

    let mut iter = segment.new_iterator(&Schema::all(Arc::clone(&schema)), opts)?;
    for row in iter.read_all()? {
        println!("   row {}: {:?}", row.row_id, row.cells);
    }

    println!("\n   raw rows read: {}", ReaderStatistics::get(&stats.raw_rows_read));
    println!("   rows removed by deletes: {}", ReaderStatistics::get(&stats.rows_del_filtered));

    fs::remove_dir_all(&temp_dir)?;
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
