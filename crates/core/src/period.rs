use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar date range.
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

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Widen both ends by `days`. Run windows derived from a candidate
    /// batch get a few days of padding so occurrences just outside the
    /// imported statement period still reconcile.
    pub fn with_buffer(self, days: i64) -> Self {
        DateRange {
            start: self.start - Duration::days(days),
            end: self.end + Duration::days(days),
        }
    }

    /// Smallest range covering every date in `dates`, or `None` when empty.
    pub fn spanning(dates: impl IntoIterator<Item = NaiveDate>) -> Option<Self> {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(DateRange { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn contains_is_inclusive() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31));
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 12, 31)));
        assert!(range.contains(date(2024, 6, 15)));
        assert!(!range.contains(date(2023, 12, 31)));
        assert!(!range.contains(date(2025, 1, 1)));
    }

    #[test]
    fn with_buffer_widens_both_ends() {
        let range = DateRange::new(date(2024, 1, 10), date(2024, 1, 20)).with_buffer(7);
        assert_eq!(range.start, date(2024, 1, 3));
        assert_eq!(range.end, date(2024, 1, 27));
    }

    #[test]
    fn spanning_finds_min_and_max() {
        let range = DateRange::spanning([date(2024, 3, 5), date(2024, 1, 9), date(2024, 2, 1)]);
        assert_eq!(range, Some(DateRange::new(date(2024, 1, 9), date(2024, 3, 5))));
    }

    #[test]
    fn spanning_empty_is_none() {
        assert_eq!(DateRange::spanning(Vec::<NaiveDate>::new()), None);
    }

    #[test]
    fn display() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31));
        assert_eq!(range.to_string(), "2024-01-01 to 2024-12-31");
    }
}
