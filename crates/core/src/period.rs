use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Inclusive window of `days` on either side of `date`.
    /// Negative widths collapse to the single day; widths past the
    /// calendar clamp to `NaiveDate::MIN`/`MAX`.
    pub fn around(date: NaiveDate, days: i64) -> Self {
        let Some(width) = Duration::try_days(days.max(0)) else {
            return DateRange::new(NaiveDate::MIN, NaiveDate::MAX);
        };
        DateRange {
            start: date.checked_sub_signed(width).unwrap_or(NaiveDate::MIN),
            end: date.checked_add_signed(width).unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Whole days between two dates, ignoring direction.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}
