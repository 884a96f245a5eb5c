use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::error::CoreError;
use crate::models::DayIndex;

/// Number of days in a planner week.
pub const DAYS_PER_WEEK: u8 = 7;

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(value: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidDate(format!("Expected YYYY-MM-DD, got '{}'", value)))
}

/// Returns the Sunday that starts the week containing `date`.
pub fn sunday_for_date(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Sunday of the current local week.
pub fn current_week_start() -> NaiveDate {
    sunday_for_date(Local::now().date_naive())
}

/// Whether `date` is a Sunday, i.e. a valid week start.
pub fn is_week_start(date: NaiveDate) -> bool {
    date.weekday().num_days_from_sunday() == 0
}

/// Date of the given day inside the week starting at `week_start`.
pub fn week_date(week_start: NaiveDate, day_index: DayIndex) -> NaiveDate {
    week_start + Duration::days(day_index as i64)
}

/// Day offset of `date` inside the week, or `None` when it falls outside it.
pub fn day_index_for(week_start: NaiveDate, date: NaiveDate) -> Option<DayIndex> {
    let offset = (date - week_start).num_days();
    if (0..DAYS_PER_WEEK as i64).contains(&offset) {
        Some(offset as DayIndex)
    } else {
        None
    }
}

/// Last date of the week (the Saturday).
pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_date(week_start, DAYS_PER_WEEK - 1)
}

/// Rejects day indexes outside `0..=6`.
pub fn validate_day_index(day_index: DayIndex) -> Result<DayIndex, CoreError> {
    if day_index < DAYS_PER_WEEK {
        Ok(day_index)
    } else {
        Err(CoreError::InvalidInput(format!(
            "Day index must be between 0 (Sunday) and 6 (Saturday), got {}",
            day_index
        )))
    }
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Whole months between the month of `from` and the month of `to`.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}
