//! Timestamp utilities

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// One calendar day
pub fn one_day() -> Duration {
    Duration::days(1)
}

/// UTC calendar date of an instant
pub fn utc_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Convert epoch milliseconds to a UTC instant
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::InvalidTime(format!("{} ms is out of range", millis)))
}

/// Parse a cutoff given on the command line or in a request.
///
/// Accepts RFC 3339 (`2024-03-01T12:00:00Z`), a bare date (`2024-03-01`,
/// interpreted as the end of that UTC day) or epoch milliseconds.
pub fn parse_cutoff(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidTime("empty cutoff".to_string()));
    }

    if let Ok(millis) = trimmed.parse::<i64>() {
        return from_millis(millis);
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| Error::InvalidTime(trimmed.to_string()))?;
        return Ok(Utc.from_utc_datetime(&end_of_day));
    }

    Err(Error::InvalidTime(trimmed.to_string()))
}
