//! Predicate algebra: per-column value ranges and scan-key compilation.

mod scan_keys;
mod value_range;

pub use scan_keys::{OlapScanKeys, OlapScanRange, ScanTuple, NULL_MARKER};
pub use value_range::{ColumnValueRange, Condition, SqlFilterOp, MAX_ENUMERATED_VALUES};

use crate::error::Result;
use crate::predicate::{ColumnPredicate, PredicateKind};
use crate::schema::TabletSchema;
use crate::types::{Date, DateTime, Datum, DecimalV2, PrimitiveType, RangeValue, StringValue, F32, F64};

/// A value range of any column type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValueRangeType {
    /// TINYINT
    TinyInt(ColumnValueRange<i8>),
    /// SMALLINT
    SmallInt(ColumnValueRange<i16>),
    /// INT
    Int(ColumnValueRange<i32>),
    /// BIGINT
    BigInt(ColumnValueRange<i64>),
    /// LARGEINT
    LargeInt(ColumnValueRange<i128>),
    /// FLOAT
    Float(ColumnValueRange<F32>),
    /// DOUBLE
    Double(ColumnValueRange<F64>),
    /// DECIMALV2
    DecimalV2(ColumnValueRange<DecimalV2>),
    /// DATE
    Date(ColumnValueRange<Date>),
    /// DATETIME
    DateTime(ColumnValueRange<DateTime>),
    /// CHAR, VARCHAR and STRING
    String(ColumnValueRange<StringValue>),
    /// BOOLEAN
    Boolean(ColumnValueRange<bool>),
}

macro_rules! dispatch {
    ($value:expr, $range:ident => $body:expr) => {
        match $value {
            ColumnValueRangeType::TinyInt($range) => $body,
            ColumnValueRangeType::SmallInt($range) => $body,
            ColumnValueRangeType::Int($range) => $body,
            ColumnValueRangeType::BigInt($range) => $body,
            ColumnValueRangeType::LargeInt($range) => $body,
            ColumnValueRangeType::Float($range) => $body,
            ColumnValueRangeType::Double($range) => $body,
            ColumnValueRangeType::DecimalV2($range) => $body,
            ColumnValueRangeType::Date($range) => $body,
            ColumnValueRangeType::DateTime($range) => $body,
            ColumnValueRangeType::String($range) => $body,
            ColumnValueRangeType::Boolean($range) => $body,
        }
    };
}

macro_rules! impl_from_range {
    ($value:ty, $variant:ident) => {
        impl From<ColumnValueRange<$value>> for ColumnValueRangeType {
            fn from(range: ColumnValueRange<$value>) -> Self {
                ColumnValueRangeType::$variant(range)
            }
        }
    };
}

impl_from_range!(i8, TinyInt);
impl_from_range!(i16, SmallInt);
impl_from_range!(i32, Int);
impl_from_range!(i64, BigInt);
impl_from_range!(i128, LargeInt);
impl_from_range!(F32, Float);
impl_from_range!(F64, Double);
impl_from_range!(DecimalV2, DecimalV2);
impl_from_range!(Date, Date);
impl_from_range!(DateTime, DateTime);
impl_from_range!(StringValue, String);
impl_from_range!(bool, Boolean);

impl ColumnValueRangeType {
    /// The whole range for a column of the given type.
    pub fn for_column(name: impl Into<String>, field_type: PrimitiveType) -> Self {
        let name = name.into();
        match field_type {
            PrimitiveType::TinyInt => ColumnValueRange::<i8>::new(name).into(),
            PrimitiveType::SmallInt => ColumnValueRange::<i16>::new(name).into(),
            PrimitiveType::Int => ColumnValueRange::<i32>::new(name).into(),
            PrimitiveType::BigInt => ColumnValueRange::<i64>::new(name).into(),
            PrimitiveType::LargeInt => ColumnValueRange::<i128>::new(name).into(),
            PrimitiveType::Float => ColumnValueRange::<F32>::new(name).into(),
            PrimitiveType::Double => ColumnValueRange::<F64>::new(name).into(),
            PrimitiveType::DecimalV2 => ColumnValueRange::<DecimalV2>::new(name).into(),
            PrimitiveType::Date => ColumnValueRange::<Date>::new(name).into(),
            PrimitiveType::DateTime => ColumnValueRange::<DateTime>::new(name).into(),
            PrimitiveType::Char | PrimitiveType::Varchar | PrimitiveType::String => {
                ColumnValueRange::<StringValue>::with_type(name, field_type).into()
            }
            PrimitiveType::Boolean => ColumnValueRange::<bool>::new(name).into(),
        }
    }

    /// Column name.
    pub fn column_name(&self) -> &str {
        dispatch!(self, r => r.column_name())
    }

    /// Declared column type.
    pub fn column_type(&self) -> Option<PrimitiveType> {
        dispatch!(self, r => r.column_type())
    }

    /// See [`ColumnValueRange::is_empty_value_range`].
    pub fn is_empty_value_range(&self) -> bool {
        dispatch!(self, r => r.is_empty_value_range())
    }

    /// See [`ColumnValueRange::is_whole_value_range`].
    pub fn is_whole_value_range(&self) -> bool {
        dispatch!(self, r => r.is_whole_value_range())
    }

    /// See [`ColumnValueRange::is_fixed_value_range`].
    pub fn is_fixed_value_range(&self) -> bool {
        dispatch!(self, r => r.is_fixed_value_range())
    }

    /// Null is admitted.
    pub fn contain_null(&self) -> bool {
        dispatch!(self, r => r.contain_null())
    }

    /// Membership test for a dynamically typed cell. Values of another
    /// type are never members.
    pub fn contains(&self, value: Option<&Datum>) -> bool {
        dispatch!(self, r => contains_datum(r, value))
    }

    /// Narrows the range by one predicate.
    pub fn apply_predicate(&mut self, kind: &PredicateKind) -> Result<()> {
        dispatch!(self, r => r.apply_predicate(kind))
    }

    /// Intersects with another range; ranges of different types intersect
    /// to the empty range.
    pub fn intersection(&mut self, other: &ColumnValueRangeType) {
        use ColumnValueRangeType as C;
        match (self, other) {
            (C::TinyInt(a), C::TinyInt(b)) => a.intersection(b),
            (C::SmallInt(a), C::SmallInt(b)) => a.intersection(b),
            (C::Int(a), C::Int(b)) => a.intersection(b),
            (C::BigInt(a), C::BigInt(b)) => a.intersection(b),
            (C::LargeInt(a), C::LargeInt(b)) => a.intersection(b),
            (C::Float(a), C::Float(b)) => a.intersection(b),
            (C::Double(a), C::Double(b)) => a.intersection(b),
            (C::DecimalV2(a), C::DecimalV2(b)) => a.intersection(b),
            (C::Date(a), C::Date(b)) => a.intersection(b),
            (C::DateTime(a), C::DateTime(b)) => a.intersection(b),
            (C::String(a), C::String(b)) => a.intersection(b),
            (C::Boolean(a), C::Boolean(b)) => a.intersection(b),
            (this, _) => dispatch!(this, r => r.set_empty_value_range()),
        }
    }

    /// Folds this range into `keys`. See [`OlapScanKeys::extend_scan_key`].
    pub fn extend_scan_key(&mut self, keys: &mut OlapScanKeys, max_scan_key_num: usize) -> bool {
        dispatch!(self, r => keys.extend_scan_key(r, max_scan_key_num))
    }

    /// See [`ColumnValueRange::to_olap_filter`].
    pub fn to_olap_filter(&self) -> Vec<Condition> {
        dispatch!(self, r => r.to_olap_filter())
    }
}

fn contains_datum<T: RangeValue>(range: &ColumnValueRange<T>, value: Option<&Datum>) -> bool {
    match value {
        None => range.contains(None),
        Some(datum) => T::from_datum(datum).is_some_and(|v| range.contains(Some(&v))),
    }
}

/// Builds one range per key column of `schema`, in key order, narrowed by
/// every predicate on that column.
pub fn build_key_ranges(
    schema: &TabletSchema,
    predicates: &[ColumnPredicate],
) -> Result<Vec<ColumnValueRangeType>> {
    let mut ranges = Vec::with_capacity(schema.num_key_columns());
    for (cid, column) in schema.columns().iter().enumerate().filter(|(_, c)| c.is_key) {
        let mut range = ColumnValueRangeType::for_column(column.name.clone(), column.field_type);
        for predicate in predicates.iter().filter(|p| p.column_id() == cid) {
            range.apply_predicate(predicate.kind())?;
        }
        ranges.push(range);
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::CompareOp;

    #[test]
    fn test_for_column_builds_whole_ranges() {
        for ty in [PrimitiveType::TinyInt, PrimitiveType::Double, PrimitiveType::Char, PrimitiveType::Boolean] {
            let range = ColumnValueRangeType::for_column("c", ty);
            assert!(range.is_whole_value_range(), "{}", ty);
            assert_eq!(range.column_type(), Some(ty));
        }
    }

    #[test]
    fn test_mismatched_intersection_is_empty() {
        let mut a = ColumnValueRangeType::for_column("c", PrimitiveType::Int);
        let b = ColumnValueRangeType::for_column("c", PrimitiveType::BigInt);
        a.intersection(&b);
        assert!(a.is_empty_value_range());
    }

    #[test]
    fn test_contains_datum() {
        let mut range = ColumnValueRangeType::for_column("c", PrimitiveType::Int);
        range.apply_predicate(&PredicateKind::Compare(CompareOp::Gt, Datum::Int(3))).unwrap();
        assert!(range.contains(Some(&Datum::Int(4))));
        assert!(!range.contains(Some(&Datum::Int(3))));
        assert!(!range.contains(Some(&Datum::BigInt(4))));
        assert!(!range.contains(None));
    }
}
