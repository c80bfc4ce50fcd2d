//! Dense daily series: one point per calendar day, zeros where the store has nothing.

use super::period::Period;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;

pub const DAY_LABEL_FORMAT: &str = "%Y-%m-%d";

/// A per-day record that can stand in for a missing day.
pub trait DailyPoint {
    fn day(&self) -> &str;
    fn empty(day: String) -> Self;
}

pub fn day_label(day: NaiveDate) -> String {
    day.format(DAY_LABEL_FORMAT).to_string()
}

/// Calendar date of `now` in the given offset.
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Days `[today - period + 1, today]`, oldest first.
pub fn window_days(today: NaiveDate, period: Period) -> Vec<NaiveDate> {
    let span = i64::from(period.days());
    (0..span)
        .map(|i| today - Duration::days(span - 1 - i))
        .collect()
}

/// Lay `records` onto `window`, substituting an empty point for every day without a record.
/// Records outside the window are dropped; when a day appears twice the first record wins.
pub fn fill_daily_gaps<P: DailyPoint>(window: &[NaiveDate], records: Vec<P>) -> Vec<P> {
    let mut by_day: HashMap<String, P> = HashMap::with_capacity(records.len());
    for record in records {
        by_day.entry(record.day().to_string()).or_insert(record);
    }

    window
        .iter()
        .map(|day| {
            let label = day_label(*day);
            by_day.remove(&label).unwrap_or_else(|| P::empty(label))
        })
        .collect()
}
