use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::{parse_date_string, Dialect};
use weekly_core::dates;
use weekly_core::models::{DayIndex, ItemType, RecurrenceFrequency, TaskStatus};

pub const DAY_NAMES: [&str; 7] = [
    "sunday", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
];

/// Parses an ISO date, falling back to natural language ("tomorrow", "next friday").
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    if let Ok(date) = dates::parse_iso_date(date_str) {
        return Ok(date);
    }
    parse_date_string(date_str, Local::now(), Dialect::Us)
        .map(|date| date.date_naive())
        .map_err(|e| anyhow::anyhow!("Failed to parse date '{}': {}", date_str, e))
}

/// Sunday of the week containing the given date.
pub fn parse_week(date_str: &str) -> Result<NaiveDate> {
    parse_date(date_str).map(dates::sunday_for_date)
}

/// Accepts `0`-`6` or a weekday name (`mon`, `Monday`, ...).
pub fn parse_day(value: &str) -> Result<DayIndex, String> {
    let value = value.trim().to_lowercase();
    if let Ok(index) = value.parse::<DayIndex>() {
        return dates::validate_day_index(index).map_err(|e| e.to_string());
    }
    DAY_NAMES
        .iter()
        .position(|name| value.len() >= 3 && name.starts_with(value.as_str()))
        .map(|index| index as DayIndex)
        .ok_or_else(|| format!("'{}' is not a day (use 0-6 or a weekday name)", value))
}

pub fn parse_status(value: &str) -> Result<TaskStatus, String> {
    value.parse::<TaskStatus>().map_err(|e| e.to_string())
}

pub fn parse_item_type(value: &str) -> Result<ItemType, String> {
    value.parse::<ItemType>().map_err(|e| e.to_string())
}

pub fn parse_frequency(value: &str) -> Result<RecurrenceFrequency, String> {
    value.parse::<RecurrenceFrequency>().map_err(|e| e.to_string())
}
