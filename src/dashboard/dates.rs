//! Date normalization for raw sheet cells.
//!
//! A date cell arrives as a day-serial number, a date string, or free text.
//! All three collapse into a `DateInfo` with a stable sortable key; free text
//! that no format recognizes becomes a label-only key that still buckets rows
//! but never participates in calendar math.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Text date formats accepted in roughly the order they show up in exports.
const TEXT_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%b %d, %Y", "%d %b %Y"];

/// A normalized date cell.
///
/// Two values are the same date iff their keys are equal. `date` is present
/// iff the raw value resolved to an actual calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateInfo {
    /// Sortable canonical key: ISO day for real dates, the raw label otherwise.
    pub key: String,
    /// Short display form, e.g. "Jun-4".
    pub label: String,
    pub date: Option<NaiveDate>,
}

impl DateInfo {
    fn from_date(date: NaiveDate) -> Self {
        DateInfo {
            key: date.format("%Y-%m-%d").to_string(),
            label: format!("{}-{}", MONTHS[date.month0() as usize], date.day()),
            date: Some(date),
        }
    }
}

/// Day-serial epoch: serial 1 is 1899-12-31, so the epoch sits one day before.
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("fixed epoch")
}

/// Convert a day-serial number to a calendar date, truncating fractional days.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor() as i64;
    serial_epoch().checked_add_signed(Duration::days(days))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc).date_naive());
    }
    TEXT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Normalize a raw date cell. Returns `None` for empty cells, which drops the
/// row from aggregation entirely.
pub fn normalize(value: &Value) -> Option<DateInfo> {
    match value {
        Value::Null => None,
        Value::Number(number) => {
            let serial = number.as_f64()?;
            serial_to_date(serial).map(DateInfo::from_date)
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Some(date) = parse_date_text(trimmed) {
                return Some(DateInfo::from_date(date));
            }
            Some(DateInfo {
                key: trimmed.to_string(),
                label: trimmed.to_string(),
                date: None,
            })
        }
        other => {
            let label = other.to_string();
            let trimmed = label.trim_matches('"').trim().to_string();
            if trimmed.is_empty() {
                return None;
            }
            Some(DateInfo {
                key: trimmed.clone(),
                label: trimmed,
                date: None,
            })
        }
    }
}

/// Sort date infos newest first. Real dates sort before label-only entries;
/// label-only entries fall back to reverse lexicographic key order.
pub fn sort_desc(infos: &[DateInfo]) -> Vec<DateInfo> {
    let mut sorted = infos.to_vec();
    sorted.sort_by(|a, b| match (a.date, b.date) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.key.cmp(&a.key),
    });
    sorted
}

/// Pick the reference day for the hub leaderboard — nominally "yesterday".
///
/// Prefers the calendar day before the freshest real date, provided that key
/// actually has hub data. Otherwise falls back to the second-most-recent
/// entry in the full descending order, then the single most-recent, then none.
pub fn pick_reference_key(infos: &[DateInfo], available: &BTreeSet<String>) -> Option<String> {
    if let Some(max_date) = infos.iter().filter_map(|info| info.date).max() {
        let yesterday = max_date - Duration::days(1);
        let key = yesterday.format("%Y-%m-%d").to_string();
        if available.contains(&key) {
            return Some(key);
        }
    }

    let sorted = sort_desc(infos);
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0].key.clone()),
        _ => Some(sorted[1].key.clone()),
    }
}
