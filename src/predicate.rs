//! Column predicates pushed down to the segment read path.
//!
//! A predicate is evaluated in two places: against a column's zone map to
//! decide whether a whole segment can be skipped, and against individual
//! cells while iterating rows.

use crate::segment::ZoneMap;
use crate::types::Datum;
use std::cmp::Ordering;
use std::fmt;
use std::mem::discriminant;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// What a predicate tests.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    /// `column op value`
    Compare(CompareOp, Datum),
    /// `column IN (values)`
    InList(Vec<Datum>),
    /// `column IS NULL`
    IsNull,
    /// `column IS NOT NULL`
    IsNotNull,
}

/// A predicate on one column, identified by its ordinal in the tablet schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPredicate {
    column_id: usize,
    kind: PredicateKind,
}

impl ColumnPredicate {
    /// Creates a predicate.
    pub fn new(column_id: usize, kind: PredicateKind) -> Self {
        Self { column_id, kind }
    }

    /// `column op value`
    pub fn compare(column_id: usize, op: CompareOp, value: impl Into<Datum>) -> Self {
        Self::new(column_id, PredicateKind::Compare(op, value.into()))
    }

    /// `column IN (values)`
    pub fn in_list(column_id: usize, values: Vec<Datum>) -> Self {
        Self::new(column_id, PredicateKind::InList(values))
    }

    /// `column IS NULL`
    pub fn is_null(column_id: usize) -> Self {
        Self::new(column_id, PredicateKind::IsNull)
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column_id: usize) -> Self {
        Self::new(column_id, PredicateKind::IsNotNull)
    }

    /// Schema ordinal of the tested column.
    pub fn column_id(&self) -> usize {
        self.column_id
    }

    /// The test itself.
    pub fn kind(&self) -> &PredicateKind {
        &self.kind
    }

    /// Evaluates the predicate against one cell; `None` is null.
    ///
    /// Comparisons with null are never true. A value of another type than
    /// the operand never matches.
    pub fn evaluate(&self, cell: Option<&Datum>) -> bool {
        match (&self.kind, cell) {
            (PredicateKind::IsNull, cell) => cell.is_none(),
            (PredicateKind::IsNotNull, cell) => cell.is_some(),
            (_, None) => false,
            (PredicateKind::Compare(op, operand), Some(value)) => {
                same_type(value, operand) && op.holds(value.cmp(operand))
            }
            (PredicateKind::InList(values), Some(value)) => values.iter().any(|v| v == value),
        }
    }

    /// Returns false only when the zone map proves that no row of the
    /// segment can satisfy the predicate.
    pub fn match_zone_map(&self, zone_map: &ZoneMap) -> bool {
        match &self.kind {
            PredicateKind::IsNull => return zone_map.has_null,
            PredicateKind::IsNotNull => return zone_map.has_not_null,
            _ => {}
        }
        if !zone_map.has_not_null {
            return false;
        }
        let (Some(min), Some(max)) = (&zone_map.min, &zone_map.max) else {
            return true;
        };

        let in_bounds = |v: &Datum| !same_type(v, min) || (v >= min && v <= max);
        match &self.kind {
            PredicateKind::Compare(op, v) if same_type(v, min) => match op {
                CompareOp::Eq => v >= min && v <= max,
                CompareOp::Ne => !(min == max && min == v),
                CompareOp::Lt => min < v,
                CompareOp::Le => min <= v,
                CompareOp::Gt => max > v,
                CompareOp::Ge => max >= v,
            },
            PredicateKind::InList(values) => values.iter().any(in_bounds),
            _ => true,
        }
    }
}

fn same_type(a: &Datum, b: &Datum) -> bool {
    discriminant(a) == discriminant(b)
}

impl fmt::Display for ColumnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredicateKind::Compare(op, v) => write!(f, "c{} {} {}", self.column_id, op.symbol(), v),
            PredicateKind::InList(values) => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "c{} IN ({})", self.column_id, list.join(","))
            }
            PredicateKind::IsNull => write!(f, "c{} IS NULL", self.column_id),
            PredicateKind::IsNotNull => write!(f, "c{} IS NOT NULL", self.column_id),
        }
    }
}
