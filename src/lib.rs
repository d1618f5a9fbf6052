//! # SegStore - Read Path of a Columnar Segment Store
//!
//! SegStore holds the read-side core of a columnar analytical storage engine:
//! it turns pushed-down predicates into per-column value ranges and key
//! ranges, opens immutable segment files, prunes them by their zone maps and
//! iterates the rows that survive, hiding rows recorded in versioned delete
//! bitmaps.
//!
//! ## Architecture
//!
//! - **Value Range**: per-column fixed-value sets or intervals, narrowed by
//!   conjunctive predicates
//! - **Scan Key Compiler**: expands key-column ranges into begin/end key tuples
//! - **Segment**: footer verification, zone-map pruning, a lazily loaded
//!   short-key index, column and bitmap index iterators
//! - **Delete Bitmap**: `(rowset, segment, version)` to deleted row ordinals
//!   under one readers-writer lock
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use segstore::predicate::{ColumnPredicate, CompareOp};
//! use segstore::range::{build_key_ranges, OlapScanKeys};
//! use segstore::schema::{Schema, TabletSchema};
//! use segstore::segment::{ReadOptions, RowwiseIterator, Segment};
//! use segstore::ScanOptions;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), segstore::Error> {
//! # let json = "";
//! let tablet_schema = Arc::new(TabletSchema::from_json(json)?);
//! let predicates = vec![ColumnPredicate::compare(0, CompareOp::Ge, 10)];
//!
//! // Compile the predicates into key ranges
//! let options = ScanOptions::default();
//! let mut ranges = build_key_ranges(&tablet_schema, &predicates)?;
//! let mut scan_keys = OlapScanKeys::new();
//! scan_keys.compile(&mut ranges, &options);
//!
//! let mut read_options =
//!     ReadOptions::from_scan_options(&options).scan_keys(&scan_keys, &tablet_schema)?;
//! for predicate in predicates {
//!     read_options = read_options.predicate(predicate);
//! }
//!
//! // Read the segment
//! let segment = Segment::open("./0.seg", 0, tablet_schema.clone())?;
//! let mut iter = segment.new_iterator(&Schema::all(tablet_schema), read_options)?;
//! for row in iter.read_all()? {
//!     println!("{}: {:?}", row.row_id, row.cells);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod delete_bitmap;
pub mod error;
pub mod predicate;
pub mod range;
pub mod schema;
pub mod segment;
pub mod types;
pub mod util;

// Re-exports
pub use config::{CompressionType, ScanOptions};
pub use delete_bitmap::{BitmapKey, DeleteBitmap, RowsetId, SetOutcome};
pub use error::{Error, Result};
pub use predicate::{ColumnPredicate, CompareOp, PredicateKind};
pub use range::{ColumnValueRange, ColumnValueRangeType, OlapScanKeys, OlapScanRange};
pub use schema::{Schema, TabletColumn, TabletSchema};
pub use segment::{ReadOptions, ReaderStatistics, RowwiseIterator, Segment, SegmentBuilder};
pub use types::{Datum, PrimitiveType};
