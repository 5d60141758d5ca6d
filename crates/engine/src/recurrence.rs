use chrono::{Datelike, Duration, NaiveDate};

use cadence_core::{ConfigError, DateRange, Frequency, Schedule};

/// Expand a schedule's recurrence rule into the concrete occurrence dates
/// inside `range`, clipped to the rule's own start/end dates.
///
/// Dates that do not exist (day 31 in February, Feb 29 outside leap years)
/// are skipped, never clamped to month end. The cycle always anchors at the
/// rule's `start_date`, so querying a later window cannot shift the phase
/// of WEEKLY or INTERVAL rules.
pub fn generate(schedule: &Schedule, range: DateRange) -> Result<Vec<NaiveDate>, ConfigError> {
    let rule = &schedule.recurrence;
    rule.validate(&schedule.id)?;

    let start = rule.start_date.max(range.start);
    let end = match rule.end_date {
        Some(rule_end) => rule_end.min(range.end),
        None => range.end,
    };
    if start > end {
        return Ok(Vec::new());
    }
    let clip = DateRange::new(start, end);

    let mut dates = match &rule.frequency {
        Frequency::Monthly { day_of_month } => monthly_on_days(&[*day_of_month], clip),
        Frequency::Bimonthly { days_of_month } => monthly_on_days(days_of_month, clip),
        Frequency::Weekly {
            day_of_week,
            interval,
        } => weekly(rule.start_date, day_of_week.to_weekday(), *interval, clip),
        Frequency::Yearly {
            month,
            day_of_month,
        } => yearly(*month, *day_of_month, clip),
        Frequency::Interval {
            interval_months,
            day_of_month,
        } => every_n_months(rule.start_date, *interval_months, *day_of_month, clip),
    };

    dates.sort_unstable();
    dates.dedup();
    Ok(dates)
}

/// One date per listed day per month. Months where a day does not exist
/// contribute nothing for that day.
fn monthly_on_days(days: &[u32], clip: DateRange) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for (year, month) in month_iter(clip.start, clip.end) {
        for &day in days {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if clip.contains(date) {
                    dates.push(date);
                }
            }
        }
    }
    dates
}

fn weekly(anchor: NaiveDate, weekday: chrono::Weekday, interval: u32, clip: DateRange) -> Vec<NaiveDate> {
    // First occurrence of the weekday on/after the rule's start date.
    let offset = (7 + weekday.num_days_from_monday() as i64
        - anchor.weekday().num_days_from_monday() as i64)
        % 7;
    let mut date = anchor + Duration::days(offset);
    let step = Duration::days(7 * interval as i64);

    let mut dates = Vec::new();
    while date <= clip.end {
        if date >= clip.start {
            dates.push(date);
        }
        date = date + step;
    }
    dates
}

fn yearly(month: u32, day: u32, clip: DateRange) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for year in clip.start.year()..=clip.end.year() {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            if clip.contains(date) {
                dates.push(date);
            }
        }
    }
    dates
}

fn every_n_months(anchor: NaiveDate, interval_months: u32, day: u32, clip: DateRange) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut months = anchor.year() * 12 + anchor.month0() as i32;
    let last = clip.end.year() * 12 + clip.end.month0() as i32;

    while months <= last {
        let (year, month0) = (months.div_euclid(12), months.rem_euclid(12) as u32);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month0 + 1, day) {
            if clip.contains(date) {
                dates.push(date);
            }
        }
        months += interval_months as i32;
    }
    dates
}

fn month_iter(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let first = start.year() * 12 + start.month0() as i32;
    let last = end.year() * 12 + end.month0() as i32;
    (first..=last).map(|m| (m.div_euclid(12), m.rem_euclid(12) as u32 + 1))
}
