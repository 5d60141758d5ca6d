use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use cadence_core::{loader, DateRange, Schedule, ScheduleFile, Transaction};
use cadence_engine::{recurrence, Matcher, Reconciler};
use cadence_import::{import_csv, load_ledger, CsvProfile};

use crate::render::render_ledger;
use crate::OutputFormat;

/// Padding around a window derived from transaction dates, so occurrences
/// falling just outside the statement period still reconcile.
const RANGE_BUFFER_DAYS: i64 = 7;

pub fn validate(path: &Path) -> Result<()> {
    let file = loader::load(path)
        .with_context(|| format!("validation failed for {}", path.display()))?;

    let enabled = file.schedules.iter().filter(|s| s.enabled).count();
    println!("Validation successful: {}", path.display());
    println!("  Total schedules: {}", file.schedules.len());
    println!("  Enabled: {enabled}");
    println!("  Disabled: {}", file.schedules.len() - enabled);
    Ok(())
}

#[derive(Serialize)]
struct ScheduleSummary<'a> {
    id: &'a str,
    enabled: bool,
    frequency: &'static str,
    account: &'a str,
    payee_pattern: &'a str,
}

pub fn list(path: &Path, enabled_only: bool, format: OutputFormat) -> Result<()> {
    let file = load_schedules(path)?;
    let schedules: Vec<&Schedule> = file
        .schedules
        .iter()
        .filter(|s| !enabled_only || s.enabled)
        .collect();

    match format {
        OutputFormat::Json => {
            let summaries: Vec<ScheduleSummary> = schedules
                .iter()
                .map(|s| ScheduleSummary {
                    id: &s.id,
                    enabled: s.enabled,
                    frequency: s.recurrence.frequency.name(),
                    account: &s.match_criteria.account,
                    payee_pattern: &s.match_criteria.payee_pattern,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Plain => {
            println!(
                "{:<28} {:<10} {:<9} {:<28} PAYEE PATTERN",
                "ID", "ENABLED", "FREQ", "ACCOUNT"
            );
            for s in &schedules {
                println!(
                    "{:<28} {:<10} {:<9} {:<28} {}",
                    s.id,
                    if s.enabled { "yes" } else { "no" },
                    s.recurrence.frequency.name(),
                    s.match_criteria.account,
                    s.match_criteria.payee_pattern
                );
            }
            println!("\n{} schedule(s)", schedules.len());
        }
    }
    Ok(())
}

pub fn occurrences(path: &Path, schedule_id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let file = load_schedules(path)?;
    let Some(schedule) = file.schedules.iter().find(|s| s.id == schedule_id) else {
        bail!("no schedule with id '{schedule_id}' in {}", path.display());
    };

    let dates = recurrence::generate(schedule, DateRange::new(from, to))?;
    for date in &dates {
        println!("{date}");
    }
    println!("\n{} occurrence(s) for '{schedule_id}' in {from} to {to}", dates.len());
    Ok(())
}

pub fn preview(
    path: &Path,
    input: &Path,
    profile: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let file = load_schedules(path)?;
    let candidates = read_candidates(input, profile)?;

    let Some(range) = resolve_range(from, to, candidates.iter().map(|t| t.date)) else {
        bail!("no transactions to preview and no explicit --from/--to range");
    };

    let occurrence_pool = occurrence_pool(&file, range);
    let mut matcher = Matcher::new(&file.config);

    for txn in &candidates {
        let amount = txn
            .main_amount()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".to_string());
        match matcher.find_best_match(txn, &occurrence_pool) {
            Some(result) => println!(
                "{} {:<32} {:>12}  -> {} (expected {}, score {:.2})",
                txn.date, txn.payee, amount, result.schedule_id, result.expected_date, result.score
            ),
            None => println!("{} {:<32} {:>12}  -> no match", txn.date, txn.payee, amount),
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn enrich(
    path: &Path,
    input: Option<&Path>,
    profile: Option<&Path>,
    ledger: Option<&Path>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    output: Option<&Path>,
) -> Result<()> {
    let file = load_schedules(path)?;

    let candidates = match (input, profile) {
        (Some(input), Some(profile)) => read_candidates(input, profile)?,
        (None, _) => Vec::new(),
        (Some(_), None) => bail!("--input requires --profile"),
    };

    let ledger_transactions = match ledger {
        Some(path) => load_ledger(path)?,
        None => Vec::new(),
    };

    let all_dates = candidates
        .iter()
        .chain(ledger_transactions.iter())
        .map(|t| t.date);
    let Some(range) = resolve_range(from, to, all_dates) else {
        bail!("no transactions found and no explicit --from/--to range");
    };
    info!("processing date range: {range}");

    let result =
        Reconciler::new(&file.config).run(&file.schedules, candidates, &ledger_transactions, range);

    for ambiguity in &result.report.ambiguities {
        warn!(
            "ambiguous match for '{}' on {}: {} candidates tied at {:.2}",
            ambiguity.schedule_id,
            ambiguity.expected_date,
            ambiguity.tied_candidates,
            ambiguity.score
        );
    }

    let rendered = render_ledger(
        result.transactions.iter().chain(result.placeholders.iter()),
        &file.config.default_currency,
    );
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

pub fn forecast(path: &Path, from: Option<NaiveDate>, days: u32) -> Result<()> {
    let file = load_schedules(path)?;
    let start = from.unwrap_or_else(|| chrono::Local::now().date_naive());
    let range = DateRange::new(start, start + chrono::Duration::days(days as i64));

    let out = cadence_engine::forecast::forecast(&file.schedules, range);
    info!(
        "{} forecast transaction(s), {} schedule(s) skipped",
        out.transactions.len(),
        out.schedules_skipped.len()
    );
    print!(
        "{}",
        render_ledger(out.transactions.iter(), &file.config.default_currency)
    );
    Ok(())
}

fn load_schedules(path: &Path) -> Result<ScheduleFile> {
    loader::load(path).with_context(|| format!("cannot load schedules from {}", path.display()))
}

fn read_candidates(input: &Path, profile: &Path) -> Result<Vec<Transaction>> {
    let profile = CsvProfile::from_toml_file(profile)
        .with_context(|| format!("cannot load import profile {}", profile.display()))?;
    let data = fs::File::open(input)
        .with_context(|| format!("cannot open {}", input.display()))?;
    let result = import_csv(data, &profile)?;
    if !result.skipped.is_empty() {
        warn!(
            "{} row(s) skipped while importing {}",
            result.skipped.len(),
            input.display()
        );
    }
    info!(
        "imported {} transaction(s) from {}",
        result.transactions.len(),
        input.display()
    );
    Ok(result.transactions)
}

/// Explicit bounds win; otherwise derive the window from the dates on hand,
/// padded so near-boundary occurrences still reconcile.
fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    dates: impl IntoIterator<Item = NaiveDate>,
) -> Option<DateRange> {
    match (from, to) {
        (Some(from), Some(to)) => Some(DateRange::new(from, to)),
        _ => {
            let derived = DateRange::spanning(dates)?.with_buffer(RANGE_BUFFER_DAYS);
            Some(DateRange::new(
                from.unwrap_or(derived.start),
                to.unwrap_or(derived.end),
            ))
        }
    }
}

/// Every (schedule, expected date) pair in range, for transaction-driven
/// previewing. Schedules with broken recurrence rules are skipped.
fn occurrence_pool(file: &ScheduleFile, range: DateRange) -> Vec<(&Schedule, NaiveDate)> {
    let mut pool = Vec::new();
    for schedule in file.schedules.iter().filter(|s| s.enabled) {
        match recurrence::generate(schedule, range) {
            Ok(dates) => pool.extend(dates.into_iter().map(|d| (schedule, d))),
            Err(e) => warn!("skipping schedule '{}': {e}", schedule.id),
        }
    }
    pool
}
