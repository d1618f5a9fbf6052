//! Compilation of per-column value ranges into ordered scan keys.
//!
//! Key columns are folded in one at a time, in key order. Fixed-value
//! columns multiply the key set (Cartesian product) while the product stays
//! within `max_scan_key_num`; the first interval column closes the key and no
//! further column may extend it.

use super::{ColumnValueRange, ColumnValueRangeType};
use crate::config::ScanOptions;
use crate::types::RangeValue;
use std::fmt;

/// Marker string carried by a null slot of a [`ScanTuple`].
pub const NULL_MARKER: &str = "null";

/// One begin or end key: a value (or null marker) per key column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTuple {
    values: Vec<String>,
    nulls: Vec<bool>,
}

impl ScanTuple {
    /// Creates an empty tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value. With `is_null` the slot stands for null; the value
    /// string is kept for diagnostics.
    pub fn add_value(&mut self, value: String, is_null: bool) {
        self.values.push(value);
        self.nulls.push(is_null);
    }

    /// Appends a null marker.
    pub fn add_null(&mut self) {
        self.add_value(NULL_MARKER.to_string(), true);
    }

    /// Number of key columns in the tuple.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String value of slot `i`.
    pub fn get_value(&self, i: usize) -> &str {
        &self.values[i]
    }

    /// Whether slot `i` is a null marker.
    pub fn is_null(&self, i: usize) -> bool {
        self.nulls[i]
    }

    /// Iterates `(value, is_null)` slots.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().map(String::as_str).zip(self.nulls.iter().copied())
    }
}

impl fmt::Display for ScanTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (value, is_null)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(if is_null { NULL_MARKER } else { value })?;
        }
        Ok(())
    }
}

/// One compiled key range handed to the index-seek layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlapScanRange {
    /// Begin key.
    pub begin_scan_range: ScanTuple,
    /// End key.
    pub end_scan_range: ScanTuple,
    /// Begin key is inclusive.
    pub begin_include: bool,
    /// End key is inclusive.
    pub end_include: bool,
}

/// Parallel begin/end key tuples built from key column ranges.
#[derive(Debug, Clone)]
pub struct OlapScanKeys {
    begin_scan_keys: Vec<ScanTuple>,
    end_scan_keys: Vec<ScanTuple>,
    has_range_value: bool,
    begin_include: bool,
    end_include: bool,
    is_convertible: bool,
    unsatisfiable: bool,
}

impl Default for OlapScanKeys {
    fn default() -> Self {
        Self {
            begin_scan_keys: Vec::new(),
            end_scan_keys: Vec::new(),
            has_range_value: false,
            begin_include: true,
            end_include: true,
            is_convertible: true,
            unsatisfiable: false,
        }
    }
}

impl OlapScanKeys {
    /// Creates an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `ranges`, given in key column order, under `options`.
    ///
    /// Returns true when the keys express every range exactly, i.e. no range
    /// was widened or left out.
    pub fn compile(&mut self, ranges: &mut [ColumnValueRangeType], options: &ScanOptions) -> bool {
        self.set_is_convertible(options.enable_range_to_fixed_conversion);
        let mut exact = true;
        for i in 0..ranges.len() {
            exact &= ranges[i].extend_scan_key(self, options.max_scan_key_num);
            if self.unsatisfiable {
                break;
            }
            if self.has_range_value {
                if ranges[i + 1..].iter().any(|r| !r.is_whole_value_range()) {
                    exact = false;
                }
                break;
            }
        }
        log::debug!("compiled {} scan keys from {} ranges, exact={}", self.size(), ranges.len(), exact);
        exact
    }

    /// Folds one more key column into the key set.
    ///
    /// May convert `range` between fixed and interval form to respect the
    /// budget. Returns false when the keys no longer express the column
    /// exactly.
    pub fn extend_scan_key<T: RangeValue>(
        &mut self,
        range: &mut ColumnValueRange<T>,
        max_scan_key_num: usize,
    ) -> bool {
        if range.is_empty_value_range() {
            self.clear();
            self.unsatisfiable = true;
            return true;
        }

        if self.has_range_value || self.unsatisfiable {
            return false;
        }

        let mut exact = true;
        let scan_keys_size = self.begin_scan_keys.len().max(1);
        let per_key_budget = max_scan_key_num / scan_keys_size;
        let null_slot = usize::from(range.contain_null());

        let mut append_fixed = false;
        if range.is_fixed_value_range() {
            if range.get_fixed_value_size() + null_slot > per_key_budget {
                if !range.is_range_value_convertible() {
                    // Leave the column out and keep the prefix keys.
                    self.has_range_value = true;
                    return false;
                }
                range.convert_to_range_value();
                exact = false;
            } else {
                append_fixed = true;
            }
        } else if self.is_convertible && range.is_fixed_value_convertible() {
            let size = range.get_convertible_fixed_value_size() + null_slot as u64;
            if size <= per_key_budget as u64 && range.convert_to_fixed_value() {
                if range.is_empty_value_range() {
                    self.clear();
                    self.unsatisfiable = true;
                    return true;
                }
                append_fixed = range.is_fixed_value_range();
            }
        }

        if append_fixed {
            self.append_fixed_values(range);
        } else {
            self.append_interval(range);
        }
        exact
    }

    /// Forms the Cartesian product of the keys with the column's fixed values.
    ///
    /// When the column admits null, the extra null clone of each prefix key is
    /// emitted before that prefix's value clones rather than after them. Null
    /// sorts below every value in the row key order, so the whole key set
    /// stays ascending and a seek can walk it front to back.
    fn append_fixed_values<T: RangeValue>(&mut self, range: &ColumnValueRange<T>) {
        let values: Vec<String> =
            range.get_fixed_value_set().iter().map(RangeValue::to_scan_string).collect();

        let (begin_base, end_base) = if self.begin_scan_keys.is_empty() {
            (vec![ScanTuple::new()], vec![ScanTuple::new()])
        } else {
            (std::mem::take(&mut self.begin_scan_keys), std::mem::take(&mut self.end_scan_keys))
        };

        for (begin, end) in begin_base.into_iter().zip(end_base) {
            if range.contain_null() {
                let mut b = begin.clone();
                b.add_null();
                let mut e = end.clone();
                e.add_null();
                self.begin_scan_keys.push(b);
                self.end_scan_keys.push(e);
            }
            for value in &values {
                let mut b = begin.clone();
                b.add_value(value.clone(), false);
                let mut e = end.clone();
                e.add_value(value.clone(), false);
                self.begin_scan_keys.push(b);
                self.end_scan_keys.push(e);
            }
        }
    }

    fn append_interval<T: RangeValue>(&mut self, range: &ColumnValueRange<T>) {
        let (low, high, begin_include, end_include) = match (
            range.get_fixed_value_set().first(),
            range.get_fixed_value_set().last(),
        ) {
            (Some(first), Some(last)) => (first.to_scan_string(), last.to_scan_string(), true, true),
            _ => (
                range.get_range_min_value().to_scan_string(),
                range.get_range_max_value().to_scan_string(),
                range.is_begin_include(),
                range.is_end_include(),
            ),
        };

        // A null-only range keeps its sentinels but both ends stand for null.
        let only_null = !range.is_fixed_value_range() && !range.is_scope_value_range();

        if self.begin_scan_keys.is_empty() {
            self.begin_scan_keys.push(ScanTuple::new());
            self.end_scan_keys.push(ScanTuple::new());
        }
        for begin in &mut self.begin_scan_keys {
            begin.add_value(low.clone(), range.contain_null());
        }
        for end in &mut self.end_scan_keys {
            end.add_value(high.clone(), only_null);
        }

        self.begin_include = begin_include || range.contain_null();
        self.end_include = end_include || only_null;
        self.has_range_value = true;
    }

    /// Materialises the key set as ranges for the index-seek layer.
    pub fn get_key_range(&self) -> Vec<OlapScanRange> {
        self.begin_scan_keys
            .iter()
            .zip(&self.end_scan_keys)
            .map(|(begin, end)| OlapScanRange {
                begin_scan_range: begin.clone(),
                end_scan_range: end.clone(),
                begin_include: self.begin_include,
                end_include: self.end_include,
            })
            .collect()
    }

    /// Drops every key and resets inclusivity.
    pub fn clear(&mut self) {
        self.has_range_value = false;
        self.begin_scan_keys.clear();
        self.end_scan_keys.clear();
        self.begin_include = true;
        self.end_include = true;
    }

    /// Number of generated keys.
    pub fn size(&self) -> usize {
        self.begin_scan_keys.len()
    }

    /// True once an interval column closed the key.
    pub fn has_range_value(&self) -> bool {
        self.has_range_value
    }

    /// True once an empty column range proved the predicate unsatisfiable.
    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }

    /// Enables or disables interval enumeration.
    pub fn set_is_convertible(&mut self, is_convertible: bool) {
        self.is_convertible = is_convertible;
    }

    /// Begin keys are inclusive.
    pub fn begin_include(&self) -> bool {
        self.begin_include
    }

    /// End keys are inclusive.
    pub fn end_include(&self) -> bool {
        self.end_include
    }

    /// Begin keys in generation order.
    pub fn begin_scan_keys(&self) -> &[ScanTuple] {
        &self.begin_scan_keys
    }

    /// End keys in generation order.
    pub fn end_scan_keys(&self) -> &[ScanTuple] {
        &self.end_scan_keys
    }

    /// Renders every key as `ScanKey=[begin : end]`.
    pub fn debug_string(&self) -> String {
        let mut out = String::from("ScanKeys:");
        for (begin, end) in self.begin_scan_keys.iter().zip(&self.end_scan_keys) {
            out.push_str(&format!(
                "ScanKey={}{} : {}{}",
                if self.begin_include { "[" } else { "(" },
                begin,
                end,
                if self.end_include { "]" } else { ")" }
            ));
        }
        out
    }
}
