//! Primitive column types and their value representations.
//!
//! Every primitive type maps to one Rust value type implementing
//! [`RangeValue`]. The trait supplies what value ranges need from a type:
//! the minimum and maximum sentinels, the external string form used in scan
//! keys, and (for countable types) enumeration of successive values.
//!
//! [`Datum`] is the dynamically typed counterpart used wherever values of
//! different columns travel together: zone maps, predicates, row cells.

mod datum;
mod temporal;

pub use datum::Datum;
pub use temporal::{Date, DateTime};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column types known to the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// 8-bit signed integer.
    TinyInt,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    /// 128-bit signed integer.
    LargeInt,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Fixed-point decimal with nine fractional digits.
    DecimalV2,
    /// Calendar date.
    Date,
    /// Date and time with second precision.
    DateTime,
    /// Fixed-length string.
    Char,
    /// Variable-length string.
    Varchar,
    /// Unbounded string.
    String,
    /// Boolean.
    Boolean,
}

impl PrimitiveType {
    /// Types whose values form a countable total order that can be
    /// enumerated one value at a time.
    pub fn is_enumeration_type(self) -> bool {
        matches!(
            self,
            PrimitiveType::TinyInt
                | PrimitiveType::SmallInt
                | PrimitiveType::Int
                | PrimitiveType::BigInt
                | PrimitiveType::Date
                | PrimitiveType::DateTime
        )
    }

    /// Returns true for the three string types.
    pub fn is_string_type(self) -> bool {
        matches!(self, PrimitiveType::Char | PrimitiveType::Varchar | PrimitiveType::String)
    }

    /// Upper-case SQL name of the type.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::TinyInt => "TINYINT",
            PrimitiveType::SmallInt => "SMALLINT",
            PrimitiveType::Int => "INT",
            PrimitiveType::BigInt => "BIGINT",
            PrimitiveType::LargeInt => "LARGEINT",
            PrimitiveType::Float => "FLOAT",
            PrimitiveType::Double => "DOUBLE",
            PrimitiveType::DecimalV2 => "DECIMALV2",
            PrimitiveType::Date => "DATE",
            PrimitiveType::DateTime => "DATETIME",
            PrimitiveType::Char => "CHAR",
            PrimitiveType::Varchar => "VARCHAR",
            PrimitiveType::String => "STRING",
            PrimitiveType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value type behind one primitive column type.
pub trait RangeValue: Ord + Clone + fmt::Debug + Send + Sync + 'static {
    /// The primitive type a range over this value type reports by default.
    const DEFAULT_TYPE: PrimitiveType;

    /// Smallest representable value.
    fn type_min() -> Self;

    /// Largest representable value.
    fn type_max() -> Self;

    /// External string form used in scan keys and storage conditions.
    fn to_scan_string(&self) -> String;

    /// The next value in the type's order, or `None` if the type cannot be
    /// enumerated or `self` is the maximum.
    fn successor(&self) -> Option<Self> {
        None
    }

    /// Number of values in the closed interval `[low, high]` for enumerable
    /// types; `None` when the type cannot be enumerated.
    fn span(_low: &Self, _high: &Self) -> Option<u64> {
        None
    }

    /// Wraps the value into a [`Datum`].
    fn into_datum(self) -> Datum;

    /// Extracts a value of this type from a [`Datum`].
    fn from_datum(datum: &Datum) -> Option<Self>;
}

fn span_of(low: i128, high: i128) -> u64 {
    if high < low {
        return 0;
    }
    u64::try_from(high - low + 1).unwrap_or(u64::MAX)
}

macro_rules! integer_range_value {
    ($ty:ty, $ptype:ident) => {
        impl RangeValue for $ty {
            const DEFAULT_TYPE: PrimitiveType = PrimitiveType::$ptype;

            fn type_min() -> Self {
                <$ty>::MIN
            }

            fn type_max() -> Self {
                <$ty>::MAX
            }

            fn to_scan_string(&self) -> String {
                self.to_string()
            }

            fn successor(&self) -> Option<Self> {
                self.checked_add(1)
            }

            fn span(low: &Self, high: &Self) -> Option<u64> {
                Some(span_of(*low as i128, *high as i128))
            }

            fn into_datum(self) -> Datum {
                Datum::$ptype(self)
            }

            fn from_datum(datum: &Datum) -> Option<Self> {
                match datum {
                    Datum::$ptype(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

integer_range_value!(i8, TinyInt);
integer_range_value!(i16, SmallInt);
integer_range_value!(i32, Int);
integer_range_value!(i64, BigInt);

impl RangeValue for i128 {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::LargeInt;

    fn type_min() -> Self {
        i128::MIN
    }

    fn type_max() -> Self {
        i128::MAX
    }

    fn to_scan_string(&self) -> String {
        self.to_string()
    }

    fn into_datum(self) -> Datum {
        Datum::LargeInt(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::LargeInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl RangeValue for bool {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::Boolean;

    fn type_min() -> Self {
        false
    }

    fn type_max() -> Self {
        true
    }

    fn to_scan_string(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }

    fn into_datum(self) -> Datum {
        Datum::Boolean(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! float_key {
    ($name:ident, $inner:ty, $bits:ty, $ptype:ident, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Ordered with IEEE 754 `totalOrder`, so every value including NaN has
        /// a place in the order. The type bounds are the two extreme NaNs, below
        /// `-inf` and above `+inf`.
        #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl $name {
            /// Parses a scan string, including the `NaN:0x..` form used for
            /// NaNs other than the canonical one.
            pub fn parse(text: &str) -> Option<Self> {
                match text.strip_prefix("NaN:0x") {
                    Some(hex) => <$bits>::from_str_radix(hex, 16)
                        .ok()
                        .map(<$inner>::from_bits)
                        .filter(|v| v.is_nan())
                        .map($name),
                    None => text.parse().ok().map($name),
                }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.total_cmp(&other.0) == Ordering::Equal
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                $name(v)
            }
        }

        impl RangeValue for $name {
            const DEFAULT_TYPE: PrimitiveType = PrimitiveType::$ptype;

            fn type_min() -> Self {
                $name(<$inner>::from_bits(<$bits>::MAX))
            }

            fn type_max() -> Self {
                $name(<$inner>::from_bits(<$bits>::MAX >> 1))
            }

            fn to_scan_string(&self) -> String {
                // Display folds every NaN into "NaN"; keep the bits so the
                // bounds survive a round trip.
                if self.0.is_nan() && self.0.to_bits() != <$inner>::NAN.to_bits() {
                    format!("NaN:{:#x}", self.0.to_bits())
                } else {
                    self.to_string()
                }
            }

            fn into_datum(self) -> Datum {
                Datum::$ptype(self)
            }

            fn from_datum(datum: &Datum) -> Option<Self> {
                match datum {
                    Datum::$ptype(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

float_key!(F32, f32, u32, Float, "A FLOAT value.");
float_key!(F64, f64, u64, Double, "A DOUBLE value.");

/// Number of fractional digits carried by [`DecimalV2`].
pub const DECIMAL_FRAC_DIGITS: u32 = 9;

const DECIMAL_SCALE: i128 = 1_000_000_000;

/// A DECIMALV2 value stored as an integer scaled by 10^9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecimalV2(pub i128);

impl DecimalV2 {
    /// Largest absolute value: 27 nines, i.e. 999999999999999999.999999999.
    pub const MAX_ABS: i128 = 999_999_999_999_999_999_999_999_999;

    /// Builds a decimal from integer and fractional parts, e.g. `(12, 500_000_000)` is 12.5.
    pub fn new(int_part: i64, frac_part: u32) -> Self {
        let sign = if int_part < 0 { -1 } else { 1 };
        DecimalV2(int_part as i128 * DECIMAL_SCALE + sign * frac_part as i128)
    }

    /// Parses a decimal such as `-12.345`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_text, frac_text) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_text.is_empty() && frac_text.is_empty() {
            return None;
        }
        if frac_text.len() > DECIMAL_FRAC_DIGITS as usize
            || !int_text.bytes().all(|b| b.is_ascii_digit())
            || !frac_text.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let int_value: i128 = if int_text.is_empty() { 0 } else { int_text.parse().ok()? };
        let mut frac_value: i128 = if frac_text.is_empty() { 0 } else { frac_text.parse().ok()? };
        for _ in frac_text.len()..DECIMAL_FRAC_DIGITS as usize {
            frac_value *= 10;
        }
        let magnitude = int_value.checked_mul(DECIMAL_SCALE)?.checked_add(frac_value)?;
        if magnitude > Self::MAX_ABS {
            return None;
        }
        Some(DecimalV2(if negative { -magnitude } else { magnitude }))
    }
}

impl fmt::Display for DecimalV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let int_part = magnitude / DECIMAL_SCALE as u128;
        let frac_part = magnitude % DECIMAL_SCALE as u128;
        if frac_part == 0 {
            return write!(f, "{}{}", sign, int_part);
        }
        let frac = format!("{:09}", frac_part);
        write!(f, "{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
    }
}

impl RangeValue for DecimalV2 {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::DecimalV2;

    fn type_min() -> Self {
        DecimalV2(-Self::MAX_ABS)
    }

    fn type_max() -> Self {
        DecimalV2(Self::MAX_ABS)
    }

    fn to_scan_string(&self) -> String {
        self.to_string()
    }

    fn into_datum(self) -> Datum {
        Datum::DecimalV2(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::DecimalV2(v) => Some(*v),
            _ => None,
        }
    }
}

/// Length of the all-0xFF byte string that stands in for the largest string.
pub const MAX_STRING_SENTINEL_LEN: usize = 255;

/// A CHAR/VARCHAR/STRING value, ordered bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringValue(pub Vec<u8>);

impl StringValue {
    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for StringValue {
    fn from(s: &str) -> Self {
        StringValue(s.as_bytes().to_vec())
    }
}

impl From<String> for StringValue {
    fn from(s: String) -> Self {
        StringValue(s.into_bytes())
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl RangeValue for StringValue {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::Varchar;

    fn type_min() -> Self {
        StringValue(Vec::new())
    }

    fn type_max() -> Self {
        StringValue(vec![0xFF; MAX_STRING_SENTINEL_LEN])
    }

    fn to_scan_string(&self) -> String {
        self.to_string()
    }

    fn into_datum(self) -> Datum {
        Datum::String(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}
