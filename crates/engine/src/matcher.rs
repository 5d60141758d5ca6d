use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use cadence_core::schedule::looks_like_regex;
use cadence_core::{AmountSpec, GlobalConfig, Money, Schedule};

use crate::util::similarity_ratio;

const PAYEE_WEIGHT: f64 = 0.4;
const AMOUNT_WEIGHT: f64 = 0.4;
const DATE_WEIGHT: f64 = 0.2;

/// Best match for one transaction among candidate occurrences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub schedule_id: String,
    pub expected_date: NaiveDate,
    pub score: f64,
    /// How many eligible candidates shared the winning score. Anything
    /// above 1 means the deterministic tie-break decided the winner.
    pub tied_candidates: usize,
}

/// Scores transactions against (schedule, expected date) pairs.
///
/// Owns per-run caches: compiled payee regexes and fuzzy ratios, both keyed
/// by normalized strings. Payees repeat heavily across a ledger, so the
/// fuzzy cache collapses most of the similarity work. Caches never outlive
/// a run; schedules are immutable while one is in flight.
pub struct Matcher<'a> {
    config: &'a GlobalConfig,
    regex_cache: HashMap<String, Option<Regex>>,
    fuzzy_cache: HashMap<(String, String), f64>,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a GlobalConfig) -> Self {
        Matcher {
            config,
            regex_cache: HashMap::new(),
            fuzzy_cache: HashMap::new(),
        }
    }

    pub fn effective_window(&self, schedule: &Schedule) -> u32 {
        schedule
            .match_criteria
            .date_window_days
            .unwrap_or(self.config.default_date_window_days)
    }

    pub fn effective_threshold(&self, schedule: &Schedule) -> f64 {
        schedule
            .match_criteria
            .match_threshold
            .unwrap_or(self.config.match_threshold)
    }

    /// Weighted confidence in [0.0, 1.0].
    ///
    /// The account comparison is a hard gate: a transaction on a different
    /// account scores 0.0 no matter how well payee, amount, and date agree.
    /// Past the gate: payee 40%, amount 40%, date proximity 20%.
    pub fn calculate_match_score(
        &mut self,
        txn: &cadence_core::Transaction,
        schedule: &Schedule,
        expected_date: NaiveDate,
    ) -> f64 {
        if txn.main_account() != Some(schedule.match_criteria.account.as_str()) {
            return 0.0;
        }

        let payee = self.payee_score(&txn.payee, &schedule.match_criteria.payee_pattern);
        let amount = self.amount_score(txn.main_amount(), schedule);
        let date = self.date_score(txn.date, expected_date, self.effective_window(schedule));

        let total = payee * PAYEE_WEIGHT + amount * AMOUNT_WEIGHT + date * DATE_WEIGHT;
        debug!(
            "scored '{}' against '{}': {total:.2} (payee={payee:.2} amount={amount:.2} date={date:.2})",
            txn.payee, schedule.id
        );
        total
    }

    /// Exact case-insensitive equality wins outright. A regex-looking
    /// pattern that matches scores 1.0; one that does not match (or does
    /// not compile) falls through to fuzzy similarity. Alternation
    /// patterns are compared branch by branch in the fuzzy path so
    /// `"Property Manager|Landlord"` still degrades gracefully.
    fn payee_score(&mut self, payee: &str, pattern: &str) -> f64 {
        if payee.trim().is_empty() {
            return 0.0;
        }

        let payee_norm = normalize(payee);
        let pattern_norm = normalize(pattern);
        if payee_norm == pattern_norm {
            return 1.0;
        }

        if looks_like_regex(pattern) {
            if let Some(re) = self.regex_for(pattern) {
                if re.is_match(payee.trim()) {
                    return 1.0;
                }
            }
        }

        if let Some(&cached) = self.fuzzy_cache.get(&(payee_norm.clone(), pattern_norm.clone())) {
            return cached;
        }
        let score = pattern_norm
            .split('|')
            .map(|branch| similarity_ratio(&payee_norm, branch.trim()))
            .fold(0.0, f64::max);
        self.fuzzy_cache.insert((payee_norm, pattern_norm), score);
        score
    }

    /// Compile-and-cache. A pattern that fails to compile is cached as
    /// `None` so the matcher degrades to fuzzy-only instead of retrying
    /// (the loader normally rejects such patterns before they get here).
    fn regex_for(&mut self, pattern: &str) -> Option<&Regex> {
        self.regex_cache
            .entry(pattern.to_string())
            .or_insert_with(|| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| debug!("payee pattern '{pattern}' is not a valid regex: {e}"))
                    .ok()
            })
            .as_ref()
    }

    fn amount_score(&self, txn_amount: Option<Money>, schedule: &Schedule) -> f64 {
        let spec = schedule.amount_spec();
        if spec == AmountSpec::Any {
            return 1.0;
        }
        let Some(actual) = txn_amount else {
            return 0.0;
        };

        match spec {
            AmountSpec::Any => 1.0,
            AmountSpec::Range { min, max } => {
                if actual >= min && actual <= max {
                    1.0
                } else {
                    0.0
                }
            }
            AmountSpec::Exact { amount, tolerance } => {
                let tolerance = tolerance.unwrap_or_else(|| {
                    Money::from_decimal(
                        amount.abs().as_decimal() * self.config.default_amount_tolerance_percent,
                    )
                });
                let diff = (actual - amount).abs();
                if diff > tolerance {
                    return 0.0;
                }
                if tolerance.is_zero() {
                    return 1.0;
                }
                let ratio = (diff.as_decimal() / tolerance.as_decimal())
                    .to_f64()
                    .unwrap_or(1.0);
                (1.0 - ratio).clamp(0.0, 1.0)
            }
        }
    }

    fn date_score(&self, txn_date: NaiveDate, expected_date: NaiveDate, window_days: u32) -> f64 {
        let diff_days = (txn_date - expected_date).num_days().unsigned_abs();
        if diff_days > window_days as u64 {
            return 0.0;
        }
        if window_days == 0 {
            return 1.0;
        }
        (1.0 - diff_days as f64 / window_days as f64).clamp(0.0, 1.0)
    }

    /// Best-scoring candidate at or above its schedule's effective
    /// threshold, or `None`. Equal scores resolve to the earliest expected
    /// date so repeated runs stay reproducible.
    pub fn find_best_match(
        &mut self,
        txn: &cadence_core::Transaction,
        candidates: &[(&Schedule, NaiveDate)],
    ) -> Option<MatchResult> {
        let mut best: Option<(usize, f64)> = None;
        let mut tied = 1;

        for (position, (schedule, expected_date)) in candidates.iter().enumerate() {
            let score = self.calculate_match_score(txn, schedule, *expected_date);
            if score < self.effective_threshold(schedule) {
                continue;
            }
            match best {
                None => {
                    best = Some((position, score));
                    tied = 1;
                }
                Some((best_position, best_score)) => {
                    if score > best_score {
                        best = Some((position, score));
                        tied = 1;
                    } else if score == best_score {
                        tied += 1;
                        if *expected_date < candidates[best_position].1 {
                            best = Some((position, score));
                        }
                    }
                }
            }
        }

        best.map(|(position, score)| {
            let (schedule, expected_date) = candidates[position];
            MatchResult {
                schedule_id: schedule.id.clone(),
                expected_date,
                score,
                tied_candidates: tied,
            }
        })
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_uppercase()
}
