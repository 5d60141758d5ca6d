use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::money::Money;

/// Metadata key linking a transaction back to the schedule that produced
/// or matched it. Sole signal used for duplicate-placeholder suppression.
pub const META_SCHEDULE_ID: &str = "schedule_id";
pub const META_MATCHED_DATE: &str = "schedule_matched_date";
pub const META_CONFIDENCE: &str = "schedule_confidence";
pub const META_PLACEHOLDER: &str = "schedule_placeholder";
pub const META_EXPECTED_DATE: &str = "schedule_expected_date";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account: String,
    /// `None` means the amount is elided (ledger balancing leg).
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
}

impl Posting {
    pub fn new(account: &str, amount: Option<Money>) -> Self {
        Posting {
            account: account.to_string(),
            amount,
            narration: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub flag: char,
    pub payee: String,
    #[serde(default)]
    pub narration: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub postings: Vec<Posting>,
}

impl Transaction {
    pub fn new(date: NaiveDate, payee: &str, postings: Vec<Posting>) -> Self {
        Transaction {
            date,
            flag: '*',
            payee: payee.to_string(),
            narration: String::new(),
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            postings,
        }
    }

    /// The account the transaction is matched on. By convention the first
    /// posting carries the bank-side leg.
    pub fn main_account(&self) -> Option<&str> {
        self.postings.first().map(|p| p.account.as_str())
    }

    pub fn main_amount(&self) -> Option<Money> {
        self.postings.first().and_then(|p| p.amount)
    }

    pub fn schedule_id(&self) -> Option<&str> {
        self.metadata.get(META_SCHEDULE_ID).map(String::as_str)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}
