use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use cadence_core::transaction::{
    META_CONFIDENCE, META_EXPECTED_DATE, META_MATCHED_DATE, META_PLACEHOLDER, META_SCHEDULE_ID,
};
use cadence_core::{DateRange, GlobalConfig, Posting, Schedule, Transaction};

use crate::date_index::DateIndex;
use crate::matcher::Matcher;
use crate::recurrence;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSchedule {
    pub id: String,
    pub reason: String,
}

/// Two or more candidates scored identically for one occurrence. The
/// deterministic tie-break already picked a winner; this is surfaced so the
/// caller can flag the occurrence for review.
#[derive(Debug, Clone, Serialize)]
pub struct MatchAmbiguity {
    pub schedule_id: String,
    pub expected_date: NaiveDate,
    pub score: f64,
    pub tied_candidates: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub schedules_processed: usize,
    pub schedules_skipped: Vec<SkippedSchedule>,
    pub occurrences: usize,
    pub matched: usize,
    /// Occurrences satisfied by a ledger entry already carrying the
    /// schedule's id, so suppressed instead of re-synthesized.
    pub already_recorded: usize,
    pub placeholders_created: usize,
    /// Candidate transactions excluded from matching for lack of a usable
    /// amount. They pass through the output untouched.
    pub unmatchable_transactions: usize,
    pub ambiguities: Vec<MatchAmbiguity>,
}

#[derive(Debug)]
pub struct ReconcileOutput {
    /// The input batch in its original order; matched entries enriched in
    /// place, everything else untouched.
    pub transactions: Vec<Transaction>,
    /// Synthesized stand-ins for unmet occurrences, ordered by date then
    /// schedule id.
    pub placeholders: Vec<Transaction>,
    pub report: RunReport,
}

/// Orchestrates one reconciliation pass: occurrence generation, matching,
/// enrichment, and placeholder synthesis. Single-threaded, deterministic:
/// the same inputs produce byte-identical outputs.
pub struct Reconciler<'a> {
    matcher: Matcher<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a GlobalConfig) -> Self {
        Reconciler {
            matcher: Matcher::new(config),
        }
    }

    pub fn run(
        mut self,
        schedules: &[Schedule],
        mut candidates: Vec<Transaction>,
        ledger: &[Transaction],
        range: DateRange,
    ) -> ReconcileOutput {
        let mut report = RunReport::default();
        let mut placeholders: Vec<Transaction> = Vec::new();

        let (candidate_index, unmatchable) = DateIndex::build_matchable(&candidates);
        report.unmatchable_transactions = unmatchable;
        if unmatchable > 0 {
            warn!("{unmatchable} candidate transaction(s) lack a usable amount and will pass through unmatched");
        }

        // Cheap pre-scan: when nothing in the ledger carries a schedule_id,
        // every per-occurrence ledger lookup would come back empty.
        let ledger_index = ledger
            .iter()
            .any(|t| t.schedule_id().is_some())
            .then(|| DateIndex::build(ledger));

        let mut claimed: HashSet<usize> = HashSet::new();

        for schedule in schedules.iter().filter(|s| s.enabled) {
            let occurrences = match recurrence::generate(schedule, range) {
                Ok(dates) => dates,
                Err(e) => {
                    warn!("skipping schedule '{}': {e}", schedule.id);
                    report.schedules_skipped.push(SkippedSchedule {
                        id: schedule.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            report.schedules_processed += 1;

            let window = self.matcher.effective_window(schedule);
            let threshold = self.matcher.effective_threshold(schedule);

            for expected_date in occurrences {
                report.occurrences += 1;

                let selected = self.select_candidate(
                    schedule,
                    expected_date,
                    window,
                    threshold,
                    &candidates,
                    &candidate_index,
                    &claimed,
                );

                if let Some((position, score, tied)) = selected {
                    if tied > 1 {
                        report.ambiguities.push(MatchAmbiguity {
                            schedule_id: schedule.id.clone(),
                            expected_date,
                            score,
                            tied_candidates: tied,
                        });
                    }
                    claimed.insert(position);
                    enrich(&mut candidates[position], schedule, expected_date, score);
                    report.matched += 1;
                    info!(
                        "matched {} '{}' to schedule '{}' (score {score:.2})",
                        candidates[position].date, candidates[position].payee, schedule.id
                    );
                    continue;
                }

                if let Some(index) = &ledger_index {
                    if ledger_has_occurrence(ledger, index, schedule, expected_date, window) {
                        report.already_recorded += 1;
                        continue;
                    }
                }

                if schedule.missing.create_placeholder {
                    placeholders.push(build_placeholder(schedule, expected_date));
                    warn!(
                        "missing scheduled transaction: {} expected on {}",
                        schedule.id, expected_date
                    );
                }
            }
        }

        placeholders.sort_by(|a, b| {
            (a.date, a.schedule_id().unwrap_or_default())
                .cmp(&(b.date, b.schedule_id().unwrap_or_default()))
        });
        report.placeholders_created = placeholders.len();

        info!(
            "reconciled {} occurrence(s): {} matched, {} already recorded, {} placeholder(s), {} schedule(s) skipped",
            report.occurrences,
            report.matched,
            report.already_recorded,
            report.placeholders_created,
            report.schedules_skipped.len()
        );

        ReconcileOutput {
            transactions: candidates,
            placeholders,
            report,
        }
    }

    /// Best unclaimed transaction for one occurrence: highest score at or
    /// above the threshold; ties resolve to the earliest transaction date,
    /// then input position (the index already yields that order, so the
    /// first contender with the winning score stands).
    #[allow(clippy::too_many_arguments)]
    fn select_candidate(
        &mut self,
        schedule: &Schedule,
        expected_date: NaiveDate,
        window: u32,
        threshold: f64,
        candidates: &[Transaction],
        index: &DateIndex,
        claimed: &HashSet<usize>,
    ) -> Option<(usize, f64, usize)> {
        let mut best: Option<(usize, f64)> = None;
        let mut tied = 1;

        for position in index.lookup_window(expected_date, window) {
            if claimed.contains(&position) {
                continue;
            }
            let score =
                self.matcher
                    .calculate_match_score(&candidates[position], schedule, expected_date);
            if score < threshold {
                continue;
            }
            match best {
                None => {
                    best = Some((position, score));
                    tied = 1;
                }
                Some((_, best_score)) if score > best_score => {
                    best = Some((position, score));
                    tied = 1;
                }
                Some((_, best_score)) if score == best_score => tied += 1,
                Some(_) => {}
            }
        }

        best.map(|(position, score)| (position, score, tied))
    }
}

fn ledger_has_occurrence(
    ledger: &[Transaction],
    index: &DateIndex,
    schedule: &Schedule,
    expected_date: NaiveDate,
    window: u32,
) -> bool {
    index
        .lookup_window(expected_date, window)
        .into_iter()
        .any(|position| ledger[position].schedule_id() == Some(schedule.id.as_str()))
}

/// Stamp a matched transaction with the schedule's identity and template.
fn enrich(txn: &mut Transaction, schedule: &Schedule, expected_date: NaiveDate, score: f64) {
    txn.set_meta(META_SCHEDULE_ID, schedule.id.clone());
    txn.set_meta(META_MATCHED_DATE, expected_date.to_string());
    txn.set_meta(META_CONFIDENCE, format!("{score:.2}"));
    for (key, value) in &schedule.template.metadata {
        if key != META_SCHEDULE_ID {
            txn.set_meta(key, value.clone());
        }
    }

    txn.tags.extend(schedule.template.tags.iter().cloned());

    if let Some(payee) = schedule.template.payee.as_deref().filter(|p| !p.is_empty()) {
        txn.payee = payee.to_string();
    }
    if let Some(narration) = schedule
        .template
        .narration
        .as_deref()
        .filter(|n| !n.is_empty())
    {
        txn.narration = narration.to_string();
    }

    if !schedule.template.postings.is_empty() {
        let postings = instantiate_postings(txn, schedule);
        txn.postings = postings;
    }
}

/// Template postings with null amounts filled from the real transaction.
///
/// With exactly one null posting it is the balancing leg: it takes the real
/// amount when its account is the matched (main) account, otherwise the
/// negated sum of the fixed amounts. With several nulls, the posting at
/// template index i takes the real transaction's posting i amount when one
/// exists, else stays elided.
fn instantiate_postings(txn: &Transaction, schedule: &Schedule) -> Vec<Posting> {
    let templates = &schedule.template.postings;
    let nulls: Vec<usize> = templates
        .iter()
        .enumerate()
        .filter(|(_, t)| t.amount.is_none())
        .map(|(i, _)| i)
        .collect();

    let balancing_amount = if nulls.len() == 1 {
        let template = &templates[nulls[0]];
        if Some(template.account.as_str()) == txn.main_account() {
            txn.main_amount()
        } else {
            Some(-templates.iter().filter_map(|t| t.amount).sum::<cadence_core::Money>())
        }
    } else {
        None
    };

    templates
        .iter()
        .enumerate()
        .map(|(i, template)| {
            let amount = match template.amount {
                Some(amount) => Some(amount),
                None if nulls.len() == 1 => balancing_amount,
                None => txn.postings.get(i).and_then(|p| p.amount),
            };
            Posting {
                account: template.account.clone(),
                amount,
                narration: template.narration.clone(),
            }
        })
        .collect()
}

/// Placeholder for an occurrence no real transaction satisfied. Carries
/// fixed template amounts only; there is no real amount to echo.
fn build_placeholder(schedule: &Schedule, expected_date: NaiveDate) -> Transaction {
    let postings = if schedule.template.postings.is_empty() {
        vec![Posting::new(&schedule.match_criteria.account, None)]
    } else {
        schedule
            .template
            .postings
            .iter()
            .map(|template| Posting {
                account: template.account.clone(),
                amount: template.amount,
                narration: template.narration.clone(),
            })
            .collect()
    };

    let narration = format!(
        "{} {}",
        schedule.missing.narration_prefix,
        schedule.template.narration.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string();

    let mut txn = Transaction::new(
        expected_date,
        schedule.template.payee.as_deref().unwrap_or_default(),
        postings,
    );
    txn.flag = schedule.missing.flag;
    txn.narration = narration;
    txn.tags = schedule.template.tags.iter().cloned().collect();
    txn.set_meta(META_SCHEDULE_ID, schedule.id.clone());
    txn.set_meta(META_PLACEHOLDER, "true");
    txn.set_meta(META_EXPECTED_DATE, expected_date.to_string());
    for (key, value) in &schedule.template.metadata {
        if key != META_SCHEDULE_ID {
            txn.set_meta(key, value.clone());
        }
    }
    txn
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::Money;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn txn(d: NaiveDate, payee: &str, account: &str, amount: &str) -> Transaction {
        Transaction::new(d, payee, vec![Posting::new(account, Some(money(amount)))])
    }

    fn rent_schedule() -> Schedule {
        serde_yaml::from_str(
            r#"
id: rent-payment
match:
  account: Assets:Bank:Checking
  payee_pattern: "Property Manager|Landlord"
  amount: -1500.00
  amount_tolerance: 0.00
  date_window_days: 3
recurrence:
  frequency: MONTHLY
  start_date: 2024-01-01
  day_of_month: 1
transaction:
  payee: "Rent Payment"
  narration: "Monthly rent"
  tags: [rent]
  metadata:
    schedule_id: rent-payment
  postings:
    - account: Assets:Bank:Checking
      amount: null
    - account: Expenses:Housing:Rent
      amount: 1500.00
missing_transaction:
  create_placeholder: true
  flag: "!"
  narration_prefix: "[MISSING]"
"#,
        )
        .unwrap()
    }

    fn run(
        schedules: &[Schedule],
        candidates: Vec<Transaction>,
        ledger: &[Transaction],
        range: DateRange,
    ) -> ReconcileOutput {
        let config = GlobalConfig::default();
        Reconciler::new(&config).run(schedules, candidates, ledger, range)
    }

    fn january() -> DateRange {
        DateRange::new(date(2024, 1, 1), date(2024, 1, 31))
    }

    #[test]
    fn rent_scenario_enriches_matched_transaction() {
        let schedules = [rent_schedule()];
        let candidates = vec![txn(
            date(2024, 1, 1),
            "PROPERTY MGR",
            "Assets:Bank:Checking",
            "-1500.00",
        )];

        let out = run(&schedules, candidates, &[], january());
        assert_eq!(out.report.matched, 1);
        assert!(out.placeholders.is_empty());

        let enriched = &out.transactions[0];
        assert_eq!(enriched.schedule_id(), Some("rent-payment"));
        assert_eq!(
            enriched.metadata.get(META_MATCHED_DATE).map(String::as_str),
            Some("2024-01-01")
        );
        assert!(enriched.metadata.contains_key(META_CONFIDENCE));
        assert!(enriched.tags.contains("rent"));
        assert_eq!(enriched.payee, "Rent Payment");
        assert_eq!(enriched.narration, "Monthly rent");
        // Balancing leg echoes the real amount; the fixed leg is declared.
        assert_eq!(enriched.postings.len(), 2);
        assert_eq!(enriched.postings[0].account, "Assets:Bank:Checking");
        assert_eq!(enriched.postings[0].amount, Some(money("-1500.00")));
        assert_eq!(enriched.postings[1].account, "Expenses:Housing:Rent");
        assert_eq!(enriched.postings[1].amount, Some(money("1500.00")));
    }

    #[test]
    fn missing_occurrence_synthesizes_placeholder() {
        let schedules = [rent_schedule()];
        // February window, no candidate anywhere near Feb 1.
        let out = run(
            &schedules,
            vec![],
            &[],
            DateRange::new(date(2024, 2, 1), date(2024, 2, 28)),
        );

        assert_eq!(out.report.placeholders_created, 1);
        let placeholder = &out.placeholders[0];
        assert_eq!(placeholder.date, date(2024, 2, 1));
        assert_eq!(placeholder.flag, '!');
        assert_eq!(placeholder.narration, "[MISSING] Monthly rent");
        assert_eq!(placeholder.schedule_id(), Some("rent-payment"));
        assert_eq!(
            placeholder.metadata.get(META_PLACEHOLDER).map(String::as_str),
            Some("true")
        );
        // Fixed amounts only; the balancing leg stays elided.
        assert_eq!(placeholder.postings[0].amount, None);
        assert_eq!(placeholder.postings[1].amount, Some(money("1500.00")));
    }

    #[test]
    fn unmatched_transactions_pass_through_unchanged() {
        let schedules = [rent_schedule()];
        let stranger = txn(date(2024, 1, 14), "COFFEE", "Assets:Bank:Checking", "-4.50");
        let out = run(&schedules, vec![stranger.clone()], &[], january());
        assert_eq!(out.transactions[0], stranger);
    }

    #[test]
    fn account_gate_blocks_cross_account_match() {
        let schedules = [rent_schedule()];
        let candidates = vec![txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Savings",
            "-1500.00",
        )];
        let out = run(&schedules, candidates, &[], january());
        assert_eq!(out.report.matched, 0);
        assert_eq!(out.report.placeholders_created, 1);
    }

    #[test]
    fn transaction_claimed_at_most_once() {
        // Two schedules that both match the same transaction; the second
        // must not re-claim it.
        let mut other = rent_schedule();
        other.id = "rent-duplicate".to_string();
        other
            .template
            .metadata
            .insert(META_SCHEDULE_ID.to_string(), "rent-duplicate".to_string());
        let schedules = [rent_schedule(), other];

        let candidates = vec![txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Checking",
            "-1500.00",
        )];
        let out = run(&schedules, candidates, &[], january());

        assert_eq!(out.report.matched, 1);
        // The losing schedule could not claim, so it reports a missing
        // occurrence instead.
        assert_eq!(out.report.placeholders_created, 1);
        assert_eq!(out.transactions[0].schedule_id(), Some("rent-payment"));
    }

    #[test]
    fn ledger_record_suppresses_placeholder() {
        let schedules = [rent_schedule()];
        let mut recorded = txn(
            date(2024, 1, 1),
            "Rent Payment",
            "Assets:Bank:Checking",
            "-1500.00",
        );
        recorded.set_meta(META_SCHEDULE_ID, "rent-payment");

        let out = run(&schedules, vec![], &[recorded], january());
        assert_eq!(out.report.already_recorded, 1);
        assert_eq!(out.report.placeholders_created, 0);
    }

    #[test]
    fn second_run_creates_no_duplicate_placeholders() {
        let schedules = [rent_schedule()];

        let first = run(&schedules, vec![], &[], january());
        assert_eq!(first.report.placeholders_created, 1);

        // Feed the synthesized placeholder back in as ledger state.
        let ledger = first.placeholders;
        let second = run(&schedules, vec![], &ledger, january());
        assert_eq!(second.report.placeholders_created, 0);
        assert_eq!(second.report.already_recorded, 1);
    }

    #[test]
    fn ledger_without_markers_is_never_consulted() {
        let schedules = [rent_schedule()];
        // Same date and shape, but no schedule_id metadata: must not
        // suppress the placeholder.
        let unmarked = txn(
            date(2024, 1, 1),
            "Rent Payment",
            "Assets:Bank:Checking",
            "-1500.00",
        );
        let out = run(&schedules, vec![], &[unmarked], january());
        assert_eq!(out.report.already_recorded, 0);
        assert_eq!(out.report.placeholders_created, 1);
    }

    #[test]
    fn disabled_schedule_is_excluded() {
        let mut schedule = rent_schedule();
        schedule.enabled = false;
        let out = run(&[schedule], vec![], &[], january());
        assert_eq!(out.report.schedules_processed, 0);
        assert_eq!(out.report.occurrences, 0);
    }

    #[test]
    fn invalid_recurrence_skips_only_that_schedule() {
        let mut broken = rent_schedule();
        broken.id = "broken".to_string();
        broken
            .template
            .metadata
            .insert(META_SCHEDULE_ID.to_string(), "broken".to_string());
        broken.recurrence.frequency = cadence_core::Frequency::Monthly { day_of_month: 0 };

        let schedules = [broken, rent_schedule()];
        let candidates = vec![txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Checking",
            "-1500.00",
        )];
        let out = run(&schedules, candidates, &[], january());

        assert_eq!(out.report.schedules_skipped.len(), 1);
        assert_eq!(out.report.schedules_skipped[0].id, "broken");
        assert_eq!(out.report.matched, 1);
    }

    #[test]
    fn amountless_transaction_is_excluded_not_fatal() {
        let schedules = [rent_schedule()];
        let mut elided = txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Checking",
            "-1500.00",
        );
        elided.postings[0].amount = None;

        let out = run(&schedules, vec![elided.clone()], &[], january());
        assert_eq!(out.report.unmatchable_transactions, 1);
        assert_eq!(out.report.matched, 0);
        assert_eq!(out.transactions[0], elided);
    }

    #[test]
    fn identical_candidates_surface_ambiguity_diagnostic() {
        let schedules = [rent_schedule()];
        let twin = txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Checking",
            "-1500.00",
        );
        let out = run(&schedules, vec![twin.clone(), twin], &[], january());

        assert_eq!(out.report.matched, 1);
        assert_eq!(out.report.ambiguities.len(), 1);
        assert_eq!(out.report.ambiguities[0].tied_candidates, 2);
        // Input order decides: the first twin wins the claim.
        assert_eq!(out.transactions[0].schedule_id(), Some("rent-payment"));
        assert_eq!(out.transactions[1].schedule_id(), None);
    }

    #[test]
    fn output_is_deterministic_across_runs() {
        let schedules = [rent_schedule()];
        let candidates = vec![
            txn(date(2024, 1, 1), "Landlord", "Assets:Bank:Checking", "-1500.00"),
            txn(date(2024, 1, 14), "COFFEE", "Assets:Bank:Checking", "-4.50"),
        ];

        let a = run(&schedules, candidates.clone(), &[], january());
        let b = run(&schedules, candidates, &[], january());
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.placeholders, b.placeholders);
    }

    #[test]
    fn multi_posting_template_maps_nulls_by_position() {
        let mut schedule = rent_schedule();
        schedule.template.postings = vec![
            cadence_core::PostingTemplate {
                account: "Assets:Bank:Checking".to_string(),
                amount: None,
                narration: None,
            },
            cadence_core::PostingTemplate {
                account: "Expenses:Housing:Rent".to_string(),
                amount: Some(money("1400.00")),
                narration: None,
            },
            cadence_core::PostingTemplate {
                account: "Expenses:Housing:Utilities".to_string(),
                amount: None,
                narration: None,
            },
        ];

        let candidates = vec![Transaction::new(
            date(2024, 1, 1),
            "Landlord",
            vec![
                Posting::new("Assets:Bank:Checking", Some(money("-1500.00"))),
                Posting::new("Expenses:Housing:Rent", Some(money("1400.00"))),
                Posting::new("Expenses:Housing:Utilities", Some(money("100.00"))),
            ],
        )];

        let out = run(&[schedule], candidates, &[], january());
        assert_eq!(out.report.matched, 1);
        let postings = &out.transactions[0].postings;
        assert_eq!(postings[0].amount, Some(money("-1500.00")));
        assert_eq!(postings[1].amount, Some(money("1400.00")));
        assert_eq!(postings[2].amount, Some(money("100.00")));
    }

    #[test]
    fn single_null_off_main_account_balances_fixed_legs() {
        let mut schedule = rent_schedule();
        schedule.template.postings = vec![
            cadence_core::PostingTemplate {
                account: "Expenses:Housing:Rent".to_string(),
                amount: Some(money("1500.00")),
                narration: None,
            },
            cadence_core::PostingTemplate {
                account: "Liabilities:Deposits".to_string(),
                amount: None,
                narration: None,
            },
        ];

        let candidates = vec![txn(
            date(2024, 1, 1),
            "Landlord",
            "Assets:Bank:Checking",
            "-1500.00",
        )];
        let out = run(&[schedule], candidates, &[], january());
        let postings = &out.transactions[0].postings;
        assert_eq!(postings[1].amount, Some(money("-1500.00")));
    }
}
