use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use cadence_core::{Money, Posting, Transaction};

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid profile: {0}")]
    Profile(#[from] toml::de::Error),
    #[error("missing column {0} in record")]
    MissingColumn(usize),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("no data rows")]
    NoDataRows,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Column mapping for one bank's CSV export, loaded from a TOML file.
/// Every imported row becomes a single posting against `account`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvProfile {
    pub name: String,
    pub account: String,
    pub date_column: usize,
    pub payee_column: usize,
    pub amount_column: usize,
    #[serde(default)]
    pub narration_column: Option<usize>,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Some exports report outflows as positive; set this to flip signs.
    #[serde(default)]
    pub negate: bool,
}

impl CsvProfile {
    pub fn from_toml_file(path: &Path) -> Result<Self, CsvError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// A data row the importer could not turn into a transaction. Reported,
/// never fatal: one bad row must not sink the batch.
#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct ImportResult {
    pub transactions: Vec<Transaction>,
    pub skipped: Vec<SkippedRow>,
}

pub fn import_csv<R: Read>(data: R, profile: &CsvProfile) -> Result<ImportResult, CsvError> {
    let delimiter = profile.delimiter.as_bytes().first().copied().unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    let mut transactions = Vec::new();
    let mut skipped = Vec::new();
    let first_data_line = if profile.has_header { 2 } else { 1 };

    for (row, result) in reader.records().enumerate() {
        let line = first_data_line + row;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("line {line}: unreadable record: {e}");
                skipped.push(SkippedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if record.is_empty() {
            continue;
        }

        match parse_record(&record, profile) {
            Ok(txn) => transactions.push(txn),
            Err(e) => {
                warn!("line {line}: {e}");
                skipped.push(SkippedRow {
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    if transactions.is_empty() && skipped.is_empty() {
        return Err(CsvError::NoDataRows);
    }

    Ok(ImportResult {
        transactions,
        skipped,
    })
}

fn parse_record(record: &csv::StringRecord, profile: &CsvProfile) -> Result<Transaction, CsvError> {
    let field = |column: usize| {
        record
            .get(column)
            .ok_or(CsvError::MissingColumn(column))
    };

    let date = parse_date(field(profile.date_column)?, &profile.date_format)?;
    let payee = field(profile.payee_column)?.trim().to_string();
    let mut amount = parse_amount(field(profile.amount_column)?)?;
    if profile.negate {
        amount = -amount;
    }

    let mut txn = Transaction::new(date, &payee, vec![Posting::new(&profile.account, Some(amount))]);
    if let Some(column) = profile.narration_column {
        if let Some(narration) = record.get(column).filter(|s| !s.trim().is_empty()) {
            txn.narration = narration.trim().to_string();
        }
    }
    Ok(txn)
}

fn parse_date(s: &str, format: &str) -> Result<NaiveDate, CsvError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &[
        "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%Y-%m-%d",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(CsvError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<Money, CsvError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    let mut dec = Decimal::from_str(&s).map_err(|_| CsvError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Money::from_decimal(dec))
}
