use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("date range start {start} is after end {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of acquisition dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Catalog temporal filter covering both ends of the range in full.
    pub fn to_temporal(&self) -> String {
        format!(
            "{}T00:00:00Z,{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_inclusive_bounds() {
        let range = DateRange::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
        assert!(range.contains(date(2023, 1, 1)));
        assert!(range.contains(date(2023, 1, 31)));
        assert!(!range.contains(date(2023, 2, 1)));
        assert!(!range.contains(date(2022, 12, 31)));
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert!(DateRange::new(date(2023, 2, 1), date(2023, 1, 1)).is_err());
    }

    #[test]
    fn test_temporal() {
        let range = DateRange::day(date(2023, 3, 5));
        assert_eq!(
            range.to_temporal(),
            "2023-03-05T00:00:00Z,2023-03-05T23:59:59Z"
        );
    }
}
