//! Per-column value ranges.
//!
//! A [`ColumnValueRange`] is the set of values one column may take under a
//! conjunction of predicates. It is either a finite set of fixed values or an
//! interval `low_op low .. high high_op`, plus a flag saying whether null is
//! admitted. The two modes never coexist: whenever the range switches into
//! one mode the other is reset to its empty form.
//!
//! The empty interval is represented by the sentinels `low = MAX`,
//! `high = MIN` with inclusive operators; every operation that produces an
//! empty interval normalises to exactly that form.

use crate::error::{Error, Result};
use crate::predicate::{CompareOp, PredicateKind};
use crate::types::{PrimitiveType, RangeValue};
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound on the number of values [`ColumnValueRange::convert_to_fixed_value`]
/// will enumerate.
pub const MAX_ENUMERATED_VALUES: u64 = 1 << 20;

/// Comparison operators a range understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlFilterOp {
    /// `>`
    Larger,
    /// `>=`
    LargerOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
}

impl SqlFilterOp {
    /// Symbol used in storage conditions and debug output.
    pub fn symbol(self) -> &'static str {
        match self {
            SqlFilterOp::Larger => ">>",
            SqlFilterOp::LargerOrEqual => ">=",
            SqlFilterOp::Less => "<<",
            SqlFilterOp::LessOrEqual => "<=",
            SqlFilterOp::In => "*=",
            SqlFilterOp::NotIn => "!*=",
        }
    }
}

/// One storage-layer filter condition rendered from a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Column the condition applies to.
    pub column_name: String,
    /// Operator: `>>`, `>=`, `<<`, `<=`, `*=`, `!*=` or `is`.
    pub condition_op: String,
    /// Operand values in their external string form.
    pub condition_values: Vec<String>,
}

impl Condition {
    fn new(column_name: &str, op: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            condition_op: op.to_string(),
            condition_values: Vec::new(),
        }
    }
}

/// The admissible values of one column.
#[derive(Clone, PartialEq)]
pub struct ColumnValueRange<T: RangeValue> {
    column_name: String,
    column_type: Option<PrimitiveType>,
    low_value: T,
    high_value: T,
    low_op: SqlFilterOp,
    high_op: SqlFilterOp,
    fixed_values: BTreeSet<T>,
    contain_null: bool,
}

impl<T: RangeValue> Default for ColumnValueRange<T> {
    /// An untyped range. Every mutation on it fails with `InvalidState`.
    fn default() -> Self {
        Self {
            column_name: String::new(),
            column_type: None,
            low_value: T::type_max(),
            high_value: T::type_min(),
            low_op: SqlFilterOp::LargerOrEqual,
            high_op: SqlFilterOp::LessOrEqual,
            fixed_values: BTreeSet::new(),
            contain_null: false,
        }
    }
}

impl<T: RangeValue> ColumnValueRange<T> {
    /// The whole range (every value and null) for a column of `T`'s default type.
    pub fn new(column_name: impl Into<String>) -> Self {
        Self::with_type(column_name, T::DEFAULT_TYPE)
    }

    /// The whole range for a column whose declared type differs from `T`'s
    /// default, e.g. a CHAR column backed by string values.
    pub fn with_type(column_name: impl Into<String>, column_type: PrimitiveType) -> Self {
        Self::with_bounds_typed(column_name, column_type, T::type_min(), T::type_max(), true)
    }

    /// A range holding the closed interval `[min, max]`.
    pub fn with_bounds(column_name: impl Into<String>, min: T, max: T, contain_null: bool) -> Self {
        Self::with_bounds_typed(column_name, T::DEFAULT_TYPE, min, max, contain_null)
    }

    fn with_bounds_typed(
        column_name: impl Into<String>,
        column_type: PrimitiveType,
        min: T,
        max: T,
        contain_null: bool,
    ) -> Self {
        let mut range = Self {
            column_name: column_name.into(),
            column_type: Some(column_type),
            low_value: min,
            high_value: max,
            low_op: SqlFilterOp::LargerOrEqual,
            high_op: SqlFilterOp::LessOrEqual,
            fixed_values: BTreeSet::new(),
            contain_null,
        };
        range.normalize_interval();
        range
    }

    /// A range admitting nothing, not even null.
    pub fn create_empty(column_name: impl Into<String>) -> Self {
        let mut range = Self::new(column_name);
        range.set_empty_value_range();
        range
    }

    fn check_typed(&self, what: &str) -> Result<()> {
        if self.column_type.is_none() {
            return Err(Error::invalid_state(format!("{} failed, invalid type", what)));
        }
        Ok(())
    }

    fn reset_interval(&mut self) {
        self.low_value = T::type_max();
        self.high_value = T::type_min();
        self.low_op = SqlFilterOp::LargerOrEqual;
        self.high_op = SqlFilterOp::LessOrEqual;
    }

    /// Collapses `[v, v]` into the fixed value `v` and resets non-ascending
    /// intervals to the empty sentinel.
    fn normalize_interval(&mut self) {
        if self.low_value == self.high_value
            && self.low_op == SqlFilterOp::LargerOrEqual
            && self.high_op == SqlFilterOp::LessOrEqual
        {
            let value = self.high_value.clone();
            self.reset_interval();
            self.fixed_values.insert(value);
        } else if !self.is_scope_value_range() {
            self.reset_interval();
        }
    }

    /// Adds `value` to the fixed set, switching the range into fixed mode.
    pub fn add_fixed_value(&mut self, value: T) -> Result<()> {
        self.check_typed("AddFixedValue")?;
        self.fixed_values.insert(value);
        self.contain_null = false;
        self.reset_interval();
        Ok(())
    }

    /// Removes `value` from the fixed set.
    pub fn remove_fixed_value(&mut self, value: &T) {
        self.fixed_values.remove(value);
    }

    /// Intersects the range with `{x : x op value}`. Always excludes null.
    pub fn add_range(&mut self, op: SqlFilterOp, value: T) -> Result<()> {
        self.check_typed("AddRange")?;
        let lower_inclusive = match op {
            SqlFilterOp::Larger => Some(false),
            SqlFilterOp::LargerOrEqual => Some(true),
            SqlFilterOp::Less | SqlFilterOp::LessOrEqual => None,
            SqlFilterOp::In | SqlFilterOp::NotIn => {
                return Err(Error::invalid_state(format!(
                    "AddRange failed, unsupported SQLFilterOp {:?}",
                    op
                )));
            }
        };

        self.contain_null = false;
        match lower_inclusive {
            Some(inclusive) => self.narrow_lower(inclusive, value),
            None => self.narrow_upper(op == SqlFilterOp::LessOrEqual, value),
        }
        Ok(())
    }

    fn narrow_lower(&mut self, inclusive: bool, value: T) {
        if self.is_fixed_value_range() {
            if inclusive {
                self.fixed_values.retain(|v| *v >= value);
            } else {
                self.fixed_values.retain(|v| *v > value);
            }
            self.reset_interval();
            return;
        }

        if self.is_scope_value_range() {
            let stricter = if inclusive { value > self.low_value } else { value >= self.low_value };
            if stricter {
                self.low_value = value;
                self.low_op =
                    if inclusive { SqlFilterOp::LargerOrEqual } else { SqlFilterOp::Larger };
            }
            self.normalize_interval();
        }
    }

    fn narrow_upper(&mut self, inclusive: bool, value: T) {
        if self.is_fixed_value_range() {
            if inclusive {
                self.fixed_values.retain(|v| *v <= value);
            } else {
                self.fixed_values.retain(|v| *v < value);
            }
            self.reset_interval();
            return;
        }

        if self.is_scope_value_range() {
            let stricter = if inclusive { value < self.high_value } else { value <= self.high_value };
            if stricter {
                self.high_value = value;
                self.high_op = if inclusive { SqlFilterOp::LessOrEqual } else { SqlFilterOp::Less };
            }
            self.normalize_interval();
        }
    }

    /// True when the range holds a non-empty fixed set.
    pub fn is_fixed_value_range(&self) -> bool {
        !self.fixed_values.is_empty()
    }

    /// True when the interval is ascending (`high > low`).
    pub fn is_scope_value_range(&self) -> bool {
        self.high_value > self.low_value
    }

    /// True when no value and no null is admitted, or the range is untyped.
    pub fn is_empty_value_range(&self) -> bool {
        if self.column_type.is_none() {
            return true;
        }
        !self.is_fixed_value_range() && !self.is_scope_value_range() && !self.contain_null
    }

    /// True for the unrestricted range: full interval, inclusive ends, null admitted.
    pub fn is_whole_value_range(&self) -> bool {
        self.fixed_values.is_empty()
            && self.low_value == T::type_min()
            && self.high_value == T::type_max()
            && self.low_op == SqlFilterOp::LargerOrEqual
            && self.high_op == SqlFilterOp::LessOrEqual
            && self.contain_null
    }

    /// Admit nothing.
    pub fn set_empty_value_range(&mut self) {
        self.fixed_values.clear();
        self.reset_interval();
        self.contain_null = false;
    }

    /// Admit everything, including null.
    pub fn set_whole_value_range(&mut self) {
        self.fixed_values.clear();
        self.low_value = T::type_min();
        self.high_value = T::type_max();
        self.low_op = SqlFilterOp::LargerOrEqual;
        self.high_op = SqlFilterOp::LessOrEqual;
        self.contain_null = true;
    }

    /// `true` makes the range `IS NULL` (only null); `false` makes it
    /// `IS NOT NULL` (every value, no null).
    pub fn set_contain_null(&mut self, contain_null: bool) {
        if contain_null {
            self.set_empty_value_range();
        } else {
            self.set_whole_value_range();
        }
        self.contain_null = contain_null;
    }

    /// Interval-to-fixed conversion is possible: interval mode over an
    /// enumerable type.
    pub fn is_fixed_value_convertible(&self) -> bool {
        if self.is_fixed_value_range() {
            return false;
        }
        match self.column_type {
            Some(t) => t.is_enumeration_type() && T::span(&self.low_value, &self.high_value).is_some(),
            None => false,
        }
    }

    /// Fixed-to-interval conversion is possible: fixed mode over anything but
    /// BOOLEAN.
    pub fn is_range_value_convertible(&self) -> bool {
        if !self.is_fixed_value_range() {
            return false;
        }
        !matches!(self.column_type, None | Some(PrimitiveType::Boolean))
    }

    /// Number of values [`convert_to_fixed_value`](Self::convert_to_fixed_value)
    /// would produce, honouring inclusivity.
    pub fn get_convertible_fixed_value_size(&self) -> u64 {
        if !self.is_fixed_value_convertible() || !self.is_scope_value_range() {
            return 0;
        }
        let mut size = T::span(&self.low_value, &self.high_value).unwrap_or(0);
        if self.low_op == SqlFilterOp::Larger {
            size = size.saturating_sub(1);
        }
        if self.high_op == SqlFilterOp::Less {
            size = size.saturating_sub(1);
        }
        size
    }

    /// Enumerates every value of the interval into the fixed set.
    ///
    /// Returns false and leaves the range untouched when the range is not
    /// convertible or would produce more than [`MAX_ENUMERATED_VALUES`].
    pub fn convert_to_fixed_value(&mut self) -> bool {
        if !self.is_fixed_value_convertible() || !self.is_scope_value_range() {
            return false;
        }
        if self.get_convertible_fixed_value_size() > MAX_ENUMERATED_VALUES {
            return false;
        }

        let mut next = if self.low_op == SqlFilterOp::Larger {
            self.low_value.successor()
        } else {
            Some(self.low_value.clone())
        };
        while let Some(value) = next {
            if value > self.high_value
                || (value == self.high_value && self.high_op == SqlFilterOp::Less)
            {
                break;
            }
            next = value.successor();
            self.fixed_values.insert(value);
        }
        self.reset_interval();
        true
    }

    /// Replaces the fixed set by the closed interval `[min, max]` of its
    /// values. Lossy when the set has gaps.
    pub fn convert_to_range_value(&mut self) -> bool {
        if !self.is_range_value_convertible() {
            return false;
        }
        let (Some(first), Some(last)) =
            (self.fixed_values.first().cloned(), self.fixed_values.last().cloned())
        else {
            return false;
        };
        self.fixed_values.clear();
        self.low_value = first;
        self.low_op = SqlFilterOp::LargerOrEqual;
        self.high_value = last;
        self.high_op = SqlFilterOp::LessOrEqual;
        self.normalize_interval();
        true
    }

    /// Interval membership, ignoring the fixed set and null.
    pub(crate) fn is_in_range(&self, value: &T) -> bool {
        let above_low = match self.low_op {
            SqlFilterOp::Larger => *value > self.low_value,
            _ => *value >= self.low_value,
        };
        let below_high = match self.high_op {
            SqlFilterOp::Less => *value < self.high_value,
            _ => *value <= self.high_value,
        };
        above_low && below_high
    }

    /// Membership test; `None` stands for null.
    pub fn contains(&self, value: Option<&T>) -> bool {
        match value {
            None => self.contain_null,
            Some(v) if self.is_fixed_value_range() => self.fixed_values.contains(v),
            Some(v) => self.is_scope_value_range() && self.is_in_range(v),
        }
    }

    /// Narrows `self` to the values admitted by both ranges.
    pub fn intersection(&mut self, other: &ColumnValueRange<T>) {
        if self.column_type != other.column_type
            || self.is_empty_value_range()
            || other.is_empty_value_range()
        {
            self.set_empty_value_range();
            return;
        }

        let contain_null = self.contain_null && other.contain_null;

        if self.is_fixed_value_range() || other.is_fixed_value_range() {
            let result: BTreeSet<T> = match (self.is_fixed_value_range(), other.is_fixed_value_range())
            {
                (true, true) => {
                    self.fixed_values.intersection(&other.fixed_values).cloned().collect()
                }
                (true, false) => {
                    let fixed = std::mem::take(&mut self.fixed_values);
                    fixed.into_iter().filter(|v| other.contains(Some(v))).collect()
                }
                _ => other.fixed_values.iter().filter(|v| self.contains(Some(*v))).cloned().collect(),
            };
            self.fixed_values = result;
            self.reset_interval();
            self.contain_null = contain_null;
            return;
        }

        if self.is_whole_value_range() && other.is_whole_value_range() {
            return;
        }

        if other.is_scope_value_range() {
            self.narrow_upper(other.high_op == SqlFilterOp::LessOrEqual, other.high_value.clone());
            self.narrow_lower(other.low_op == SqlFilterOp::LargerOrEqual, other.low_value.clone());
        } else {
            self.reset_interval();
        }
        self.contain_null = contain_null;
    }

    /// Non-mutating check whether [`intersection`](Self::intersection) would
    /// leave anything admitted.
    pub fn has_intersection(&self, other: &ColumnValueRange<T>) -> bool {
        if self.column_type != other.column_type
            || self.is_empty_value_range()
            || other.is_empty_value_range()
        {
            return false;
        }

        if self.contain_null && other.contain_null {
            return true;
        }

        match (self.is_fixed_value_range(), other.is_fixed_value_range()) {
            (true, true) => {
                self.fixed_values.intersection(&other.fixed_values).next().is_some()
            }
            (true, false) => self.fixed_values.iter().any(|v| other.contains(Some(v))),
            (false, true) => other.fixed_values.iter().any(|v| self.contains(Some(v))),
            (false, false) => {
                if !self.is_scope_value_range() || !other.is_scope_value_range() {
                    return false;
                }
                if self.low_value > other.high_value || other.low_value > self.high_value {
                    false
                } else if self.low_value == other.high_value {
                    self.low_op == SqlFilterOp::LargerOrEqual
                        && other.high_op == SqlFilterOp::LessOrEqual
                } else if other.low_value == self.high_value {
                    other.low_op == SqlFilterOp::LargerOrEqual
                        && self.high_op == SqlFilterOp::LessOrEqual
                } else {
                    true
                }
            }
        }
    }

    /// Narrows the range by one pushed-down predicate.
    ///
    /// `!=` cannot be expressed as a range and leaves it unchanged.
    pub fn apply_predicate(&mut self, kind: &PredicateKind) -> Result<()> {
        self.check_typed("ApplyPredicate")?;
        let column_type = self.column_type.unwrap_or(T::DEFAULT_TYPE);
        let typed = |datum: &crate::types::Datum| {
            T::from_datum(datum).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "value {} does not match column {} of type {}",
                    datum, self.column_name, column_type
                ))
            })
        };

        match kind {
            PredicateKind::Compare(CompareOp::Ne, _) => Ok(()),
            PredicateKind::Compare(CompareOp::Eq, datum) => {
                let mut other = Self::with_type(self.column_name.clone(), column_type);
                other.add_fixed_value(typed(datum)?)?;
                self.intersection(&other);
                Ok(())
            }
            PredicateKind::Compare(op, datum) => {
                let value = typed(datum)?;
                let op = match op {
                    CompareOp::Lt => SqlFilterOp::Less,
                    CompareOp::Le => SqlFilterOp::LessOrEqual,
                    CompareOp::Gt => SqlFilterOp::Larger,
                    _ => SqlFilterOp::LargerOrEqual,
                };
                self.add_range(op, value)
            }
            PredicateKind::InList(values) => {
                let mut other = Self::with_type(self.column_name.clone(), column_type);
                other.set_empty_value_range();
                for datum in values {
                    other.add_fixed_value(typed(datum)?)?;
                }
                self.intersection(&other);
                Ok(())
            }
            PredicateKind::IsNull | PredicateKind::IsNotNull => {
                let mut other = Self::with_type(self.column_name.clone(), column_type);
                other.set_contain_null(matches!(kind, PredicateKind::IsNull));
                self.intersection(&other);
                Ok(())
            }
        }
    }

    /// Renders the range as storage-layer filter conditions.
    pub fn to_olap_filter(&self) -> Vec<Condition> {
        let mut filters = Vec::new();
        if self.is_fixed_value_range() {
            filters.extend(self.to_in_condition(true));
        } else if self.is_scope_value_range() {
            if self.low_value == T::type_min()
                && self.low_op == SqlFilterOp::LargerOrEqual
                && self.high_value == T::type_max()
                && self.high_op == SqlFilterOp::LessOrEqual
                && !self.contain_null
            {
                let mut not_null = Condition::new(&self.column_name, "is");
                not_null.condition_values.push("not null".to_string());
                filters.push(not_null);
                return filters;
            }

            if self.low_value != T::type_min() || self.low_op != SqlFilterOp::LargerOrEqual {
                let mut low = Condition::new(&self.column_name, self.low_op.symbol());
                low.condition_values.push(self.low_value.to_scan_string());
                filters.push(low);
            }

            if self.high_value != T::type_max() || self.high_op != SqlFilterOp::LessOrEqual {
                let mut high = Condition::new(&self.column_name, self.high_op.symbol());
                high.condition_values.push(self.high_value.to_scan_string());
                filters.push(high);
            }
        } else if self.contain_null {
            let mut is_null = Condition::new(&self.column_name, "is");
            is_null.condition_values.push("null".to_string());
            filters.push(is_null);
        }
        filters
    }

    /// Renders the fixed set as an `IN` (or `NOT IN`) condition.
    pub fn to_in_condition(&self, is_in: bool) -> Option<Condition> {
        if self.fixed_values.is_empty() {
            return None;
        }
        let op = if is_in { SqlFilterOp::In } else { SqlFilterOp::NotIn };
        let mut condition = Condition::new(&self.column_name, op.symbol());
        condition.condition_values =
            self.fixed_values.iter().map(RangeValue::to_scan_string).collect();
        Some(condition)
    }

    /// The fixed values in ascending order.
    pub fn get_fixed_value_set(&self) -> &BTreeSet<T> {
        &self.fixed_values
    }

    /// Number of fixed values.
    pub fn get_fixed_value_size(&self) -> usize {
        self.fixed_values.len()
    }

    /// Lower interval bound.
    pub fn get_range_min_value(&self) -> &T {
        &self.low_value
    }

    /// Upper interval bound.
    pub fn get_range_max_value(&self) -> &T {
        &self.high_value
    }

    /// Lower bound is the type minimum.
    pub fn is_low_value_minimum(&self) -> bool {
        self.low_value == T::type_min()
    }

    /// Upper bound is the type maximum.
    pub fn is_high_value_maximum(&self) -> bool {
        self.high_value == T::type_max()
    }

    /// Lower bound is inclusive.
    pub fn is_begin_include(&self) -> bool {
        self.low_op == SqlFilterOp::LargerOrEqual
    }

    /// Upper bound is inclusive.
    pub fn is_end_include(&self) -> bool {
        self.high_op == SqlFilterOp::LessOrEqual
    }

    /// Lower bound operator.
    pub fn low_op(&self) -> SqlFilterOp {
        self.low_op
    }

    /// Upper bound operator.
    pub fn high_op(&self) -> SqlFilterOp {
        self.high_op
    }

    /// Declared column type; `None` for an untyped range.
    pub fn column_type(&self) -> Option<PrimitiveType> {
        self.column_type
    }

    /// Column name.
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Null is admitted.
    pub fn contain_null(&self) -> bool {
        self.contain_null
    }
}

impl<T: RangeValue> fmt::Debug for ColumnValueRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ColumnValueRange");
        s.field("column", &self.column_name).field("type", &self.column_type);
        if self.is_fixed_value_range() {
            s.field("fixed_values", &self.fixed_values);
        } else {
            s.field("low", &(self.low_op.symbol(), &self.low_value))
                .field("high", &(self.high_op.symbol(), &self.high_value));
        }
        s.field("contain_null", &self.contain_null).finish()
    }
}
