//! Next-run computation for recurrence rules
//!
//! Pure calendar arithmetic, all in UTC. Given a rule, a time of day and the
//! current instant, returns the nearest future instant the rule fires at.
//! A candidate in the past rolls forward to the next period.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};

use mediaflow_core::domain::schedule::Recurrence;

/// Monthly rules never fire later than this day, so every month qualifies.
pub const MONTHLY_DAY_CAP: u32 = 28;

/// Computes the next instant a rule fires at, strictly from `now` onward
pub fn next_occurrence(
    recurrence: &Recurrence,
    time_of_day: NaiveTime,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match recurrence {
        Recurrence::Once | Recurrence::Daily => next_daily(time_of_day, now),
        Recurrence::Weekly { days } => next_weekly(days, time_of_day, now),
        Recurrence::Monthly { day_of_month } => next_monthly(*day_of_month, time_of_day, now),
    }
}

fn next_daily(time_of_day: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = now.date_naive().and_time(time_of_day).and_utc();
    if candidate < now {
        candidate + chrono::Duration::days(1)
    } else {
        candidate
    }
}

fn next_weekly(days: &[Weekday], time_of_day: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    days.iter()
        .map(|day| {
            let offset = (day.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            let candidate = (today + chrono::Duration::days(offset))
                .and_time(time_of_day)
                .and_utc();
            if candidate < now {
                candidate + chrono::Duration::days(7)
            } else {
                candidate
            }
        })
        .min()
        // no days selected behaves like a daily rule
        .unwrap_or_else(|| next_daily(time_of_day, now))
}

fn next_monthly(day_of_month: u8, time_of_day: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let day = u32::from(day_of_month).clamp(1, MONTHLY_DAY_CAP);
    let today = now.date_naive();

    let candidate = NaiveDate::from_ymd_opt(today.year(), today.month(), day)
        .expect("days up to 28 exist in every month")
        .and_time(time_of_day)
        .and_utc();
    if candidate >= now {
        return candidate;
    }

    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("days up to 28 exist in every month")
        .and_time(time_of_day)
        .and_utc()
}
