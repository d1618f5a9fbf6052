//! Segment files: an immutable slice of a tablet's rows stored column by
//! column, with statistics and a sparse short-key index.
//!
//! ## File Format
//!
//! ```text
//! [column 0 data pages]
//! [column 0 bitmap index page]   // optional
//! ...
//! [column N data pages]
//! [short-key index page]
//! [footer body]                  // bincode
//! [footer length: u32 LE][footer crc32c: u32 LE][magic: 4 bytes]
//! ```
//!
//! ## Page Format
//!
//! ```text
//! [body][compression: u8][crc32c(body): u32 LE]
//! ```
//!
//! The checksum covers the stored, possibly compressed, body.

mod builder;
mod column_reader;
mod file;
mod footer;
mod iterator;
mod page;
mod reader;
mod short_key_index;

pub use builder::SegmentBuilder;
pub use column_reader::{BitmapIndexIterator, ColumnIterator, ColumnReader, DefaultValueColumnIterator};
pub use file::FileReader;
pub use footer::{ColumnMeta, DataPageMeta, SegmentFooter, ZoneMap};
pub use iterator::{
    EmptySegmentIterator, ReadOptions, ReaderStatistics, Row, RowKeyRange, RowwiseIterator,
    SegmentIterator,
};
pub use page::PagePointer;
pub use reader::Segment;
pub use short_key_index::ShortKeyIndex;

/// Magic constant closing every segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"SGM1";

/// Size of the fixed trailer: footer length, footer checksum, magic.
pub const TRAILER_SIZE: usize = 12;

/// Footer format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Default number of rows per column data page.
pub const DEFAULT_ROWS_PER_PAGE: usize = 1024;
