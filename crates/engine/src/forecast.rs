use tracing::{debug, warn};

use cadence_core::transaction::META_SCHEDULE_ID;
use cadence_core::{DateRange, Money, Posting, Schedule, Transaction};

use crate::reconcile::SkippedSchedule;
use crate::recurrence;
use crate::EngineError;

/// Flag carried by generated forecast entries.
pub const FORECAST_FLAG: char = '#';

#[derive(Debug)]
pub struct ForecastOutput {
    /// Forecast transactions ordered by date, then schedule id.
    pub transactions: Vec<Transaction>,
    pub schedules_skipped: Vec<SkippedSchedule>,
}

/// Project schedules forward: one `#`-flagged transaction per occurrence in
/// `range`, built entirely from the template. Unlike enrichment there is no
/// real amount to echo, so the single elided posting becomes the balancing
/// leg against the sum of the fixed amounts.
pub fn forecast(schedules: &[Schedule], range: DateRange) -> ForecastOutput {
    let mut transactions = Vec::new();
    let mut schedules_skipped = Vec::new();

    for schedule in schedules.iter().filter(|s| s.enabled) {
        let result = forecast_schedule(schedule, range);
        match result {
            Ok(mut generated) => {
                debug!(
                    "schedule '{}': {} forecast occurrence(s)",
                    schedule.id,
                    generated.len()
                );
                transactions.append(&mut generated);
            }
            Err(e) => {
                warn!("skipping schedule '{}': {e}", schedule.id);
                schedules_skipped.push(SkippedSchedule {
                    id: schedule.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    transactions.sort_by(|a, b| {
        (a.date, a.schedule_id().unwrap_or_default())
            .cmp(&(b.date, b.schedule_id().unwrap_or_default()))
    });

    ForecastOutput {
        transactions,
        schedules_skipped,
    }
}

fn forecast_schedule(
    schedule: &Schedule,
    range: DateRange,
) -> Result<Vec<Transaction>, EngineError> {
    let postings = forecast_postings(schedule)?;
    let occurrences = recurrence::generate(schedule, range)?;

    Ok(occurrences
        .into_iter()
        .map(|date| {
            let mut txn = Transaction::new(
                date,
                schedule.template.payee.as_deref().unwrap_or_default(),
                postings.clone(),
            );
            txn.flag = FORECAST_FLAG;
            txn.narration = schedule.template.narration.clone().unwrap_or_default();
            txn.tags = schedule.template.tags.iter().cloned().collect();
            txn.set_meta(META_SCHEDULE_ID, schedule.id.clone());
            for (key, value) in &schedule.template.metadata {
                if key != META_SCHEDULE_ID {
                    txn.set_meta(key, value.clone());
                }
            }
            txn
        })
        .collect())
}

/// Resolve the template into fully-amounted postings. At most one posting
/// may elide its amount, and at least one must declare an amount, or the
/// balancing leg cannot be computed.
fn forecast_postings(schedule: &Schedule) -> Result<Vec<Posting>, EngineError> {
    let templates = &schedule.template.postings;
    if templates.is_empty() {
        return Err(EngineError::NoTemplatePostings {
            schedule: schedule.id.clone(),
        });
    }

    let nulls = templates.iter().filter(|t| t.amount.is_none()).count();
    if nulls > 1 {
        return Err(EngineError::MultipleElidedPostings {
            schedule: schedule.id.clone(),
        });
    }
    if nulls == templates.len() {
        return Err(EngineError::NoFixedAmounts {
            schedule: schedule.id.clone(),
        });
    }

    let balancing: Money = -templates.iter().filter_map(|t| t.amount).sum::<Money>();

    Ok(templates
        .iter()
        .map(|template| Posting {
            account: template.account.clone(),
            amount: Some(template.amount.unwrap_or(balancing)),
            narration: template.narration.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn rent_schedule() -> Schedule {
        serde_yaml::from_str(
            r#"
id: rent-monthly
match:
  account: Assets:Bank:Checking
  payee_pattern: "Landlord"
recurrence:
  frequency: MONTHLY
  start_date: 2024-01-01
  day_of_month: 1
transaction:
  payee: "Rent Payment"
  narration: "Monthly rent"
  tags: [rent]
  metadata:
    schedule_id: rent-monthly
  postings:
    - account: Expenses:Housing:Rent
      amount: 1500.00
    - account: Assets:Bank:Checking
      amount: null
"#,
        )
        .unwrap()
    }

    fn quarter() -> DateRange {
        DateRange::new(date(2024, 1, 1), date(2024, 3, 31))
    }

    #[test]
    fn generates_one_entry_per_occurrence() {
        let out = forecast(&[rent_schedule()], quarter());
        assert_eq!(out.transactions.len(), 3);
        assert!(out.schedules_skipped.is_empty());

        let first = &out.transactions[0];
        assert_eq!(first.date, date(2024, 1, 1));
        assert_eq!(first.flag, FORECAST_FLAG);
        assert_eq!(first.payee, "Rent Payment");
        assert_eq!(first.schedule_id(), Some("rent-monthly"));
    }

    #[test]
    fn balancing_leg_negates_fixed_sum() {
        let out = forecast(&[rent_schedule()], quarter());
        let postings = &out.transactions[0].postings;
        assert_eq!(postings[0].amount, Some(money("1500.00")));
        assert_eq!(postings[1].amount, Some(money("-1500.00")));
    }

    #[test]
    fn multiple_elided_postings_skip_the_schedule() {
        let mut schedule = rent_schedule();
        schedule.template.postings[0].amount = None;
        let out = forecast(&[schedule], quarter());
        assert!(out.transactions.is_empty());
        assert_eq!(out.schedules_skipped.len(), 1);
        assert!(out.schedules_skipped[0].reason.contains("elided"));
    }

    #[test]
    fn template_without_postings_skips_the_schedule() {
        let mut schedule = rent_schedule();
        schedule.template.postings.clear();
        let out = forecast(&[schedule], quarter());
        assert_eq!(out.schedules_skipped.len(), 1);
    }

    #[test]
    fn one_broken_schedule_does_not_sink_the_batch() {
        let mut broken = rent_schedule();
        broken.id = "broken".to_string();
        broken
            .template
            .metadata
            .insert(META_SCHEDULE_ID.to_string(), "broken".to_string());
        broken.template.postings.clear();

        let out = forecast(&[broken, rent_schedule()], quarter());
        assert_eq!(out.transactions.len(), 3);
        assert_eq!(out.schedules_skipped.len(), 1);
    }

    #[test]
    fn output_sorted_by_date_then_schedule() {
        let mut other = rent_schedule();
        other.id = "another-monthly".to_string();
        other
            .template
            .metadata
            .insert(META_SCHEDULE_ID.to_string(), "another-monthly".to_string());

        let out = forecast(&[rent_schedule(), other], quarter());
        let keys: Vec<_> = out
            .transactions
            .iter()
            .map(|t| (t.date, t.schedule_id().unwrap().to_string()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(out.transactions[0].schedule_id(), Some("another-monthly"));
    }

    #[test]
    fn disabled_schedules_are_ignored() {
        let mut schedule = rent_schedule();
        schedule.enabled = false;
        let out = forecast(&[schedule], quarter());
        assert!(out.transactions.is_empty());
        assert!(out.schedules_skipped.is_empty());
    }
}
