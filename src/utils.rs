use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{AppError, AppResult};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Lower-cased, trimmed email used both as a lookup key and as the worker identifier.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Parses a calendar date. Accepts `YYYY-MM-DD` and full RFC 3339 timestamps (date part kept).
pub fn parse_date(field: &str, raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| AppError::bad_request(format!("{field} must be a date in YYYY-MM-DD format")))
}

/// Parses an inclusive `[start, end]` pair and rejects `end < start`.
pub fn parse_range(
    start_field: &str,
    start: &str,
    end_field: &str,
    end: &str,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let start_date = parse_date(start_field, start)?;
    let end_date = parse_date(end_field, end)?;

    if end_date < start_date {
        return Err(AppError::bad_request(format!("{end_field} must be >= {start_field}")));
    }

    Ok((start_date, end_date))
}

/// Every calendar day of the inclusive range, in order.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

pub fn add_days(date: NaiveDate, days: u32) -> AppResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| AppError::bad_request("resulting date is out of range"))
}

/// Deserializes a JSON value, reporting the offending field path on failure.
pub fn decode_json<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    Ok(serde_path_to_error::deserialize(value)?)
}
