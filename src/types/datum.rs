//! Dynamically typed values.

use super::{Date, DateTime, DecimalV2, PrimitiveType, RangeValue, StringValue, F32, F64};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-null value of any primitive type.
///
/// Nullable cells are modelled as `Option<Datum>`. Values of the same variant
/// compare by their natural order; values of different variants compare by
/// variant, which only matters for keeping collections well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Datum {
    /// BOOLEAN
    Boolean(bool),
    /// TINYINT
    TinyInt(i8),
    /// SMALLINT
    SmallInt(i16),
    /// INT
    Int(i32),
    /// BIGINT
    BigInt(i64),
    /// LARGEINT
    LargeInt(i128),
    /// FLOAT
    Float(F32),
    /// DOUBLE
    Double(F64),
    /// DECIMALV2
    DecimalV2(DecimalV2),
    /// DATE
    Date(Date),
    /// DATETIME
    DateTime(DateTime),
    /// CHAR, VARCHAR and STRING
    String(StringValue),
}

impl Datum {
    /// Parses the textual form of a value of the given type.
    ///
    /// Accepts exactly what [`Datum::to_scan_string`] produces, plus
    /// `true`/`false` for booleans.
    pub fn parse(field_type: PrimitiveType, text: &str) -> Result<Datum> {
        let invalid = || {
            Error::invalid_argument(format!("cannot parse {:?} as {}", text, field_type))
        };
        let trimmed = text.trim();
        let datum = match field_type {
            PrimitiveType::TinyInt => Datum::TinyInt(trimmed.parse().map_err(|_| invalid())?),
            PrimitiveType::SmallInt => Datum::SmallInt(trimmed.parse().map_err(|_| invalid())?),
            PrimitiveType::Int => Datum::Int(trimmed.parse().map_err(|_| invalid())?),
            PrimitiveType::BigInt => Datum::BigInt(trimmed.parse().map_err(|_| invalid())?),
            PrimitiveType::LargeInt => Datum::LargeInt(trimmed.parse().map_err(|_| invalid())?),
            PrimitiveType::Float => Datum::Float(F32::parse(trimmed).ok_or_else(invalid)?),
            PrimitiveType::Double => Datum::Double(F64::parse(trimmed).ok_or_else(invalid)?),
            PrimitiveType::DecimalV2 => {
                Datum::DecimalV2(DecimalV2::parse(trimmed).ok_or_else(invalid)?)
            }
            PrimitiveType::Date => Datum::Date(Date::parse(trimmed).ok_or_else(invalid)?),
            PrimitiveType::DateTime => {
                Datum::DateTime(DateTime::parse(trimmed).ok_or_else(invalid)?)
            }
            PrimitiveType::Char | PrimitiveType::Varchar | PrimitiveType::String => {
                Datum::String(StringValue::from(text))
            }
            PrimitiveType::Boolean => match trimmed {
                "1" | "true" | "TRUE" => Datum::Boolean(true),
                "0" | "false" | "FALSE" => Datum::Boolean(false),
                _ => return Err(invalid()),
            },
        };
        Ok(datum)
    }

    /// Returns true if this value can be stored in a column of `field_type`.
    pub fn is_compatible(&self, field_type: PrimitiveType) -> bool {
        matches!(
            (self, field_type),
            (Datum::Boolean(_), PrimitiveType::Boolean)
                | (Datum::TinyInt(_), PrimitiveType::TinyInt)
                | (Datum::SmallInt(_), PrimitiveType::SmallInt)
                | (Datum::Int(_), PrimitiveType::Int)
                | (Datum::BigInt(_), PrimitiveType::BigInt)
                | (Datum::LargeInt(_), PrimitiveType::LargeInt)
                | (Datum::Float(_), PrimitiveType::Float)
                | (Datum::Double(_), PrimitiveType::Double)
                | (Datum::DecimalV2(_), PrimitiveType::DecimalV2)
                | (Datum::Date(_), PrimitiveType::Date)
                | (Datum::DateTime(_), PrimitiveType::DateTime)
                | (Datum::String(_), PrimitiveType::Char)
                | (Datum::String(_), PrimitiveType::Varchar)
                | (Datum::String(_), PrimitiveType::String)
        )
    }

    /// External string form, identical to the scan-key representation.
    pub fn to_scan_string(&self) -> String {
        match self {
            Datum::Boolean(v) => v.to_scan_string(),
            Datum::TinyInt(v) => v.to_scan_string(),
            Datum::SmallInt(v) => v.to_scan_string(),
            Datum::Int(v) => v.to_scan_string(),
            Datum::BigInt(v) => v.to_scan_string(),
            Datum::LargeInt(v) => v.to_scan_string(),
            Datum::Float(v) => v.to_scan_string(),
            Datum::Double(v) => v.to_scan_string(),
            Datum::DecimalV2(v) => v.to_scan_string(),
            Datum::Date(v) => v.to_scan_string(),
            Datum::DateTime(v) => v.to_scan_string(),
            Datum::String(v) => v.to_scan_string(),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_scan_string())
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::BigInt(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(StringValue::from(v))
    }
}
