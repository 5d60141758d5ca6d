use chrono::{NaiveDate, Weekday};
use regex::RegexBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::money::Money;
use crate::transaction::META_SCHEDULE_ID;

/// Flags a ledger transaction may carry. `#` marks forecast entries.
pub const LEDGER_FLAGS: &[char] = &['*', '!', 'P', 'A', 'S', 'R', 'C', 'U', '?', '#'];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("schedule id cannot be empty")]
    EmptyId,
    #[error("schedule '{schedule}': day_of_month {day} is out of range 1-31")]
    InvalidDayOfMonth { schedule: String, day: u32 },
    #[error("schedule '{schedule}': month {month} is out of range 1-12")]
    InvalidMonth { schedule: String, month: u32 },
    #[error("schedule '{schedule}': interval must be at least 1")]
    InvalidInterval { schedule: String },
    #[error("schedule '{schedule}': days_of_month cannot be empty")]
    EmptyDaysOfMonth { schedule: String },
    #[error("schedule '{schedule}': amount_tolerance cannot be negative")]
    NegativeTolerance { schedule: String },
    #[error("schedule '{schedule}': amount_min exceeds amount_max")]
    AmountRangeInverted { schedule: String },
    #[error("schedule '{schedule}': match_threshold {value} is outside 0.0-1.0")]
    InvalidThreshold { schedule: String, value: f64 },
    #[error("schedule '{schedule}': payee_pattern '{pattern}' is not a valid regex: {message}")]
    InvalidRegex {
        schedule: String,
        pattern: String,
        message: String,
    },
    #[error("schedule '{schedule}': transaction metadata must contain 'schedule_id'")]
    MissingScheduleIdMetadata { schedule: String },
    #[error("schedule '{schedule}': metadata schedule_id '{found}' does not match the schedule id")]
    ScheduleIdMismatch { schedule: String, found: String },
    #[error("schedule '{schedule}': '{flag}' is not a ledger flag")]
    InvalidFlag { schedule: String, flag: char },
    #[error("config: match_threshold {value} is outside 0.0-1.0")]
    InvalidGlobalThreshold { value: f64 },
    #[error("config: default_amount_tolerance_percent cannot be negative")]
    NegativeTolerancePercent,
    #[error("schedule file '{file}': id '{id}' does not match the file name")]
    IdFilenameMismatch { id: String, file: String },
    #[error("duplicate schedule id '{id}'")]
    DuplicateId { id: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    MON,
    TUE,
    WED,
    THU,
    FRI,
    SAT,
    SUN,
}

impl DayOfWeek {
    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::MON => Weekday::Mon,
            DayOfWeek::TUE => Weekday::Tue,
            DayOfWeek::WED => Weekday::Wed,
            DayOfWeek::THU => Weekday::Thu,
            DayOfWeek::FRI => Weekday::Fri,
            DayOfWeek::SAT => Weekday::Sat,
            DayOfWeek::SUN => Weekday::Sun,
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// Recurrence frequency as a closed sum type: each variant carries only the
/// parameters that frequency uses, so a rule missing a required parameter
/// (or naming an unknown frequency) fails at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frequency")]
pub enum Frequency {
    #[serde(rename = "MONTHLY")]
    Monthly { day_of_month: u32 },
    #[serde(rename = "WEEKLY")]
    Weekly {
        day_of_week: DayOfWeek,
        #[serde(default = "default_interval")]
        interval: u32,
    },
    #[serde(rename = "YEARLY")]
    Yearly { month: u32, day_of_month: u32 },
    #[serde(rename = "BIMONTHLY")]
    Bimonthly { days_of_month: Vec<u32> },
    #[serde(rename = "INTERVAL")]
    Interval {
        interval_months: u32,
        day_of_month: u32,
    },
}

impl Frequency {
    pub fn name(&self) -> &'static str {
        match self {
            Frequency::Monthly { .. } => "MONTHLY",
            Frequency::Weekly { .. } => "WEEKLY",
            Frequency::Yearly { .. } => "YEARLY",
            Frequency::Bimonthly { .. } => "BIMONTHLY",
            Frequency::Interval { .. } => "INTERVAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub frequency: Frequency,
}

impl RecurrenceRule {
    /// Range checks serde cannot express. Violations abort only the owning
    /// schedule, not the run.
    pub fn validate(&self, schedule_id: &str) -> Result<(), ConfigError> {
        let check_day = |day: u32| -> Result<(), ConfigError> {
            if !(1..=31).contains(&day) {
                return Err(ConfigError::InvalidDayOfMonth {
                    schedule: schedule_id.to_string(),
                    day,
                });
            }
            Ok(())
        };

        match &self.frequency {
            Frequency::Monthly { day_of_month } => check_day(*day_of_month),
            Frequency::Weekly { interval, .. } => {
                if *interval < 1 {
                    return Err(ConfigError::InvalidInterval {
                        schedule: schedule_id.to_string(),
                    });
                }
                Ok(())
            }
            Frequency::Yearly {
                month,
                day_of_month,
            } => {
                if !(1..=12).contains(month) {
                    return Err(ConfigError::InvalidMonth {
                        schedule: schedule_id.to_string(),
                        month: *month,
                    });
                }
                check_day(*day_of_month)
            }
            Frequency::Bimonthly { days_of_month } => {
                if days_of_month.is_empty() {
                    return Err(ConfigError::EmptyDaysOfMonth {
                        schedule: schedule_id.to_string(),
                    });
                }
                days_of_month.iter().try_for_each(|d| check_day(*d))
            }
            Frequency::Interval {
                interval_months,
                day_of_month,
            } => {
                if *interval_months < 1 {
                    return Err(ConfigError::InvalidInterval {
                        schedule: schedule_id.to_string(),
                    });
                }
                check_day(*day_of_month)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub account: String,
    pub payee_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_tolerance: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_window_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
}

/// Amount constraint collapsed from the criteria's optional fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountSpec {
    Exact {
        amount: Money,
        tolerance: Option<Money>,
    },
    Range {
        min: Money,
        max: Money,
    },
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingTemplate {
    pub account: String,
    /// `None` means "take the amount from the real transaction".
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postings: Vec<PostingTemplate>,
}

fn default_true() -> bool {
    true
}

fn default_flag() -> char {
    '!'
}

fn default_prefix() -> String {
    "[MISSING]".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingPolicy {
    #[serde(default = "default_true")]
    pub create_placeholder: bool,
    #[serde(default = "default_flag")]
    pub flag: char,
    #[serde(default = "default_prefix")]
    pub narration_prefix: String,
}

impl Default for MissingPolicy {
    fn default() -> Self {
        MissingPolicy {
            create_placeholder: true,
            flag: '!',
            narration_prefix: "[MISSING]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "match")]
    pub match_criteria: MatchCriteria,
    pub recurrence: RecurrenceRule,
    #[serde(rename = "transaction")]
    pub template: TransactionTemplate,
    #[serde(default, rename = "missing_transaction")]
    pub missing: MissingPolicy,
}

impl Schedule {
    /// Amount constraint for the matcher. An explicit range wins; otherwise
    /// the expected amount is the criteria's `amount` or, failing that, the
    /// template posting declared for the matched account.
    pub fn amount_spec(&self) -> AmountSpec {
        let criteria = &self.match_criteria;
        if let (Some(min), Some(max)) = (criteria.amount_min, criteria.amount_max) {
            return AmountSpec::Range { min, max };
        }
        let expected = criteria.amount.or_else(|| {
            self.template
                .postings
                .iter()
                .find(|p| p.account == criteria.account)
                .and_then(|p| p.amount)
        });
        match expected {
            Some(amount) => AmountSpec::Exact {
                amount,
                tolerance: criteria.amount_tolerance,
            },
            None => AmountSpec::Any,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }

        self.recurrence.validate(&self.id)?;

        let criteria = &self.match_criteria;
        if let Some(tolerance) = criteria.amount_tolerance {
            if tolerance < Money::zero() {
                return Err(ConfigError::NegativeTolerance {
                    schedule: self.id.clone(),
                });
            }
        }
        if let (Some(min), Some(max)) = (criteria.amount_min, criteria.amount_max) {
            if min > max {
                return Err(ConfigError::AmountRangeInverted {
                    schedule: self.id.clone(),
                });
            }
        }
        if let Some(threshold) = criteria.match_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidThreshold {
                    schedule: self.id.clone(),
                    value: threshold,
                });
            }
        }

        // Only patterns that look like regexes must compile; a plain fuzzy
        // pattern is free to contain no metacharacters at all.
        if looks_like_regex(&criteria.payee_pattern) {
            if let Err(e) = RegexBuilder::new(&criteria.payee_pattern)
                .case_insensitive(true)
                .build()
            {
                return Err(ConfigError::InvalidRegex {
                    schedule: self.id.clone(),
                    pattern: criteria.payee_pattern.clone(),
                    message: e.to_string(),
                });
            }
        }

        match self.template.metadata.get(META_SCHEDULE_ID) {
            None => {
                return Err(ConfigError::MissingScheduleIdMetadata {
                    schedule: self.id.clone(),
                })
            }
            Some(found) if found != &self.id => {
                return Err(ConfigError::ScheduleIdMismatch {
                    schedule: self.id.clone(),
                    found: found.clone(),
                })
            }
            Some(_) => {}
        }

        if !LEDGER_FLAGS.contains(&self.missing.flag) {
            return Err(ConfigError::InvalidFlag {
                schedule: self.id.clone(),
                flag: self.missing.flag,
            });
        }

        Ok(())
    }
}

/// Heuristic from the matching algorithm: a pattern containing any of these
/// is treated as a regular expression rather than a fuzzy string.
pub fn looks_like_regex(pattern: &str) -> bool {
    const INDICATORS: &[&str] = &["|", ".*", ".+", "\\", "[", "]", "(", ")", "^", "$"];
    INDICATORS.iter().any(|i| pattern.contains(i))
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_threshold() -> f64 {
    0.80
}

fn default_window() -> u32 {
    3
}

fn default_tolerance_percent() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_window")]
    pub default_date_window_days: u32,
    #[serde(default = "default_tolerance_percent")]
    pub default_amount_tolerance_percent: Decimal,
    #[serde(default = "default_flag")]
    pub placeholder_flag: char,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            default_currency: default_currency(),
            match_threshold: default_threshold(),
            default_date_window_days: default_window(),
            default_amount_tolerance_percent: default_tolerance_percent(),
            placeholder_flag: default_flag(),
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::InvalidGlobalThreshold {
                value: self.match_threshold,
            });
        }
        if self.default_amount_tolerance_percent < Decimal::ZERO {
            return Err(ConfigError::NegativeTolerancePercent);
        }
        Ok(())
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub config: GlobalConfig,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Default for ScheduleFile {
    fn default() -> Self {
        ScheduleFile {
            version: default_version(),
            config: GlobalConfig::default(),
            schedules: Vec::new(),
        }
    }
}
