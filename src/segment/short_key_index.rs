//! Sparse short-key index.
//!
//! The index holds the short key (leading key columns) of the first row of
//! every block of `num_rows_per_block` rows. Keys compare column by column
//! with null ordered before every value; a key shorter than an index entry
//! compares as a prefix.

use super::iterator::RowKeyRange;
use crate::error::{Error, Result};
use crate::types::Datum;
use std::cmp::Ordering;
use std::ops::Range;

/// A key tuple; `None` is null.
pub type KeyTuple = Vec<Option<Datum>>;

/// Compares the common prefix of two key tuples.
pub(crate) fn compare_key_prefix(a: &[Option<Datum>], b: &[Option<Datum>]) -> Ordering {
    a.iter().zip(b).map(|(x, y)| x.cmp(y)).find(|o| o.is_ne()).unwrap_or(Ordering::Equal)
}

/// The parsed short-key index of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortKeyIndex {
    keys: Vec<KeyTuple>,
    num_rows_per_block: u64,
    num_rows: u64,
}

impl ShortKeyIndex {
    /// Serialises block keys into an index page body.
    pub fn encode_keys(keys: &[KeyTuple]) -> Result<Vec<u8>> {
        Ok(bincode::serialize(keys)?)
    }

    /// Parses an index page body.
    pub fn decode(body: &[u8], num_rows_per_block: u64, num_rows: u64) -> Result<Self> {
        let keys: Vec<KeyTuple> = bincode::deserialize(body)
            .map_err(|e| Error::corruption(format!("malformed short key index: {}", e)))?;
        let expected_blocks = num_rows.div_ceil(num_rows_per_block.max(1));
        if keys.len() as u64 != expected_blocks {
            return Err(Error::corruption(format!(
                "short key index has {} entries, expected {} for {} rows",
                keys.len(),
                expected_blocks,
                num_rows
            )));
        }
        if keys.windows(2).any(|w| compare_key_prefix(&w[0], &w[1]) == Ordering::Greater) {
            return Err(Error::corruption("short key index entries are not sorted"));
        }
        Ok(Self { keys, num_rows_per_block, num_rows })
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.keys.len()
    }

    /// Short key of the first row of `block`.
    pub fn key(&self, block: usize) -> &[Option<Datum>] {
        &self.keys[block]
    }

    /// First block whose first key is not less than `key`.
    pub fn lower_bound(&self, key: &[Option<Datum>]) -> usize {
        self.keys.partition_point(|k| compare_key_prefix(k, key) == Ordering::Less)
    }

    /// First block whose first key is greater than `key`.
    pub fn upper_bound(&self, key: &[Option<Datum>]) -> usize {
        self.keys.partition_point(|k| compare_key_prefix(k, key) != Ordering::Greater)
    }

    /// Row ordinals covered by `block`.
    pub fn block_rows(&self, block: usize) -> Range<u64> {
        let start = block as u64 * self.num_rows_per_block;
        start.min(self.num_rows)..(start + self.num_rows_per_block).min(self.num_rows)
    }

    /// Candidate rows for `range`: every row that may lie inside it, and
    /// possibly some that do not.
    pub fn row_range(&self, range: &RowKeyRange) -> Range<u64> {
        let start_block = if range.lower.is_empty() {
            0
        } else {
            // The block before the first not-less one may still hold matches.
            self.lower_bound(&range.lower).saturating_sub(1)
        };
        let end_block =
            if range.upper.is_empty() { self.keys.len() } else { self.upper_bound(&range.upper) };
        if end_block <= start_block {
            return 0..0;
        }
        self.block_rows(start_block).start..self.block_rows(end_block - 1).end
    }
}
