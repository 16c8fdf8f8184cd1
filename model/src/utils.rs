use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::{Occurrence, Weekday, WeeklySchedule};

/// Horizon applied to open-ended series when expanding occurrences.
pub const DEFAULT_RECURRENCE_WEEKS: i64 = 12;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn default_horizon(start: NaiveDate) -> NaiveDate {
    start + Duration::weeks(DEFAULT_RECURRENCE_WEEKS)
}

/// Expand a weekly schedule over `[start, end]` (inclusive) into the ordered
/// list of concrete slots.
///
/// Pure and deterministic. Selected weekdays without a configured time are
/// skipped rather than rejected, so a partially configured schedule expands
/// to what is configured so far; an inverted range expands to nothing.
pub fn expand_occurrences(
    start: NaiveDate,
    end: NaiveDate,
    schedule: &WeeklySchedule,
) -> Vec<Occurrence> {
    let mut occurrences = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        if let Some(day) = Weekday::from_chrono(cursor.weekday()) {
            if let Some(time) = schedule.time_for(day) {
                occurrences.push(Occurrence { date: cursor, time });
            }
        }
        cursor = match cursor.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    occurrences
}
