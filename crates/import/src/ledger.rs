use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use cadence_core::Transaction;

#[derive(Error, Debug)]
pub enum LedgerIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid ledger snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a ledger snapshot (JSON array of transactions). This is the
/// engine's view of "what the ledger already contains"; producing the
/// snapshot is the ledger toolchain's job.
pub fn load_ledger(path: &Path) -> Result<Vec<Transaction>, LedgerIoError> {
    let text = fs::read_to_string(path)?;
    let transactions: Vec<Transaction> = serde_json::from_str(&text)?;
    info!(
        "loaded {} ledger transaction(s) from {}",
        transactions.len(),
        path.display()
    );
    Ok(transactions)
}

pub fn save_ledger(path: &Path, transactions: &[Transaction]) -> Result<(), LedgerIoError> {
    let text = serde_json::to_string_pretty(transactions)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Money, Posting};
    use chrono::NaiveDate;

    #[test]
    fn round_trips_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let mut txn = Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "Landlord",
            vec![Posting::new(
                "Assets:Bank:Checking",
                Some("-1500.00".parse::<Money>().unwrap()),
            )],
        );
        txn.set_meta("schedule_id", "rent-monthly");

        save_ledger(&path, &[txn.clone()]).unwrap();
        let back = load_ledger(&path).unwrap();
        assert_eq!(back, vec![txn]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_ledger(&path), Err(LedgerIoError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_ledger(Path::new("/nonexistent/ledger.json")),
            Err(LedgerIoError::Io(_))
        ));
    }
}
