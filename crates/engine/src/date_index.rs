use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

use cadence_core::Transaction;

/// Date-keyed index over a transaction slice.
///
/// Stores positions into the caller's slice rather than clones, so the
/// reconciler can claim and mutate transactions by index. Built in one
/// pass, never mutated afterwards. The ordered map makes a window lookup a
/// bounded range scan instead of a pass over the whole batch.
#[derive(Debug)]
pub struct DateIndex {
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
}

impl DateIndex {
    /// Index every transaction, regardless of shape. Suitable for ledger
    /// lookups that only inspect dates and metadata.
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (position, txn) in transactions.iter().enumerate() {
            by_date.entry(txn.date).or_default().push(position);
        }
        DateIndex { by_date }
    }

    /// Index only transactions the matcher can score: at least one posting
    /// with a usable amount. Returns the count of transactions left out so
    /// the caller can report them.
    pub fn build_matchable(transactions: &[Transaction]) -> (Self, usize) {
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        let mut skipped = 0;
        for (position, txn) in transactions.iter().enumerate() {
            if txn.main_amount().is_none() {
                skipped += 1;
                continue;
            }
            by_date.entry(txn.date).or_default().push(position);
        }
        (DateIndex { by_date }, skipped)
    }

    /// Positions of all transactions dated within `center ± window_days`,
    /// inclusive, ordered by date and then input position. A window of 0
    /// returns exact-date transactions only. Empty output is a valid "no
    /// candidate on file" answer.
    pub fn lookup_window(&self, center: NaiveDate, window_days: u32) -> Vec<usize> {
        let low = center - Duration::days(window_days as i64);
        let high = center + Duration::days(window_days as i64);
        self.by_date
            .range(low..=high)
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}
