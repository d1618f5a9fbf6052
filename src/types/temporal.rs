//! DATE and DATETIME values.
//!
//! Dates are days since 1970-01-01 in the proleptic Gregorian calendar and
//! date-times are seconds since 1970-01-01 00:00:00. The supported span is
//! 0000-01-01 through 9999-12-31, matching the storage layer's limits.

use super::{Datum, PrimitiveType, RangeValue};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

const fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { y + 1 } else { y }, month, day)
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn parse_date_part(text: &str) -> Option<i64> {
    let mut parts = text.splitn(3, '-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(0..=9999).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    if day == 0 || day > days_in_month(year, month) {
        return None;
    }
    Some(days_from_civil(year, month, day))
}

/// A calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date(pub i32);

impl Date {
    /// 0000-01-01
    pub const MIN: Date = Date(days_from_civil(0, 1, 1) as i32);
    /// 9999-12-31
    pub const MAX: Date = Date(days_from_civil(9999, 12, 31) as i32);

    /// Builds a date from its calendar fields, validating them.
    pub fn from_ymd(year: i64, month: u32, day: u32) -> Option<Self> {
        parse_date_part(&format!("{}-{}-{}", year, month, day)).map(|d| Date(d as i32))
    }

    /// Parses `YYYY-MM-DD`.
    pub fn parse(text: &str) -> Option<Self> {
        parse_date_part(text.trim()).map(|d| Date(d as i32))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, m, d) = civil_from_days(self.0 as i64);
        write!(f, "{:04}-{:02}-{:02}", y, m, d)
    }
}

impl RangeValue for Date {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::Date;

    fn type_min() -> Self {
        Date::MIN
    }

    fn type_max() -> Self {
        Date::MAX
    }

    fn to_scan_string(&self) -> String {
        self.to_string()
    }

    fn successor(&self) -> Option<Self> {
        if *self >= Date::MAX {
            None
        } else {
            Some(Date(self.0 + 1))
        }
    }

    fn span(low: &Self, high: &Self) -> Option<u64> {
        Some(super::span_of(low.0 as i128, high.0 as i128))
    }

    fn into_datum(self) -> Datum {
        Datum::Date(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::Date(v) => Some(*v),
            _ => None,
        }
    }
}

/// A date and time of day with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateTime(pub i64);

impl DateTime {
    /// 0000-01-01 00:00:00
    pub const MIN: DateTime = DateTime(days_from_civil(0, 1, 1) * SECONDS_PER_DAY);
    /// 9999-12-31 23:59:59
    pub const MAX: DateTime =
        DateTime(days_from_civil(9999, 12, 31) * SECONDS_PER_DAY + SECONDS_PER_DAY - 1);

    /// Parses `YYYY-MM-DD HH:MM:SS`, or a bare date meaning midnight.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (date_text, time_text) = match text.split_once(' ') {
            Some((d, t)) => (d, Some(t.trim())),
            None => (text, None),
        };
        let days = parse_date_part(date_text)?;
        let seconds = match time_text {
            None => 0,
            Some(t) => {
                let mut parts = t.splitn(3, ':');
                let h: i64 = parts.next()?.parse().ok()?;
                let m: i64 = parts.next()?.parse().ok()?;
                let s: i64 = parts.next()?.parse().ok()?;
                if !(0..24).contains(&h) || !(0..60).contains(&m) || !(0..60).contains(&s) {
                    return None;
                }
                h * 3600 + m * 60 + s
            }
        };
        Some(DateTime(days * SECONDS_PER_DAY + seconds))
    }

    /// The calendar date part.
    pub fn date(&self) -> Date {
        Date(self.0.div_euclid(SECONDS_PER_DAY) as i32)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.rem_euclid(SECONDS_PER_DAY);
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date(),
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}

impl RangeValue for DateTime {
    const DEFAULT_TYPE: PrimitiveType = PrimitiveType::DateTime;

    fn type_min() -> Self {
        DateTime::MIN
    }

    fn type_max() -> Self {
        DateTime::MAX
    }

    fn to_scan_string(&self) -> String {
        self.to_string()
    }

    fn successor(&self) -> Option<Self> {
        if *self >= DateTime::MAX {
            None
        } else {
            Some(DateTime(self.0 + 1))
        }
    }

    fn span(low: &Self, high: &Self) -> Option<u64> {
        Some(super::span_of(low.0 as i128, high.0 as i128))
    }

    fn into_datum(self) -> Datum {
        Datum::DateTime(self)
    }

    fn from_datum(datum: &Datum) -> Option<Self> {
        match datum {
            Datum::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(Date::parse("1970-01-01"), Some(Date(0)));
        assert_eq!(Date(0).to_string(), "1970-01-01");
        assert_eq!(Date(-1).to_string(), "1969-12-31");
    }

    #[test]
    fn test_date_bounds() {
        assert_eq!(Date::MIN.to_string(), "0000-01-01");
        assert_eq!(Date::MAX.to_string(), "9999-12-31");
        assert_eq!(Date::MAX.successor(), None);
        assert_eq!(DateTime::MAX.to_string(), "9999-12-31 23:59:59");
    }

    #[test]
    fn test_date_validation() {
        assert!(Date::parse("2024-02-29").is_some());
        assert!(Date::parse("2023-02-29").is_none());
        assert!(Date::parse("2023-13-01").is_none());
        assert!(Date::parse("not a date").is_none());
        assert_eq!(Date::from_ymd(2020, 3, 1), Date::parse("2020-03-01"));
    }

    #[test]
    fn test_datetime_roundtrip_text() {
        let dt = DateTime::parse("2021-06-15 08:09:10").unwrap();
        assert_eq!(dt.to_string(), "2021-06-15 08:09:10");
        assert_eq!(DateTime::parse("2021-06-15").unwrap().to_string(), "2021-06-15 00:00:00");
        assert!(DateTime::parse("2021-06-15 24:00:00").is_none());
    }

    #[test]
    fn test_date_span() {
        let a = Date::parse("2024-01-30").unwrap();
        let b = Date::parse("2024-02-02").unwrap();
        assert_eq!(Date::span(&a, &b), Some(4));
        assert_eq!(a.successor().unwrap().to_string(), "2024-01-31");
    }
}
