//! Time handling shared by the importers.
//!
//! All times are UTC. The command line accepts `YYYY-MM-DDTHH:MM`; the
//! sources expect ISO 8601 intervals; THREDDS files carry CF-style numeric
//! time axes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::model::ImportError;

/// Format accepted on the command line, always interpreted as UTC.
pub const CLI_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

pub fn parse_cli_time(s: &str) -> Result<DateTime<Utc>, ImportError> {
    NaiveDateTime::parse_from_str(s.trim(), CLI_TIME_FORMAT)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .map_err(|e| ImportError::Parse(format!("'{}' is not YYYY-MM-DDTHH:MM: {}", s, e)))
}

pub fn floor_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// `2019-01-01T00:00:00Z/2019-12-31T23:59:00Z`
pub fn iso_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{}/{}",
        start.format("%Y-%m-%dT%H:%M:%SZ"),
        end.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Splits `[start, end]` into calendar-year batches.
///
/// The first batch starts at `start`, every later batch on Jan 1 00:00. The
/// last batch ends at `end`, every earlier batch on Dec 31 23:59.
pub fn year_batches(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if end < start {
        return Vec::new();
    }
    let years = end.year() - start.year();
    (0..=years)
        .filter_map(|batch| {
            let year = start.year() + batch;
            let batch_start = if batch == 0 {
                start
            } else {
                Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?
            };
            let batch_end = if batch == years {
                end
            } else {
                Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 0).single()?
            };
            Some((batch_start, batch_end))
        })
        .collect()
}

/// Every calendar date from `start`'s date to `end`'s date, inclusive.
pub fn days_inclusive(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let last = end.date_naive();
    let mut day = start.date_naive();
    let mut days = Vec::new();
    while day <= last {
        days.push(day);
        day += Duration::days(1);
    }
    days
}

// ---------------------------------------------------------------------------
// CF time axes
// ---------------------------------------------------------------------------

/// Seconds per CF time unit, or `None` for units this crate does not decode.
fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "seconds" | "second" | "secs" | "s" => Some(1.0),
        "minutes" | "minute" | "mins" | "min" => Some(60.0),
        "hours" | "hour" | "hrs" | "h" => Some(3600.0),
        "days" | "day" | "d" => Some(86400.0),
        _ => None,
    }
}

/// Splits CF units such as `seconds since 1970-01-01 00:00:00` into the
/// length of one unit in seconds and the epoch.
pub fn parse_cf_units(units: &str) -> Option<(f64, DateTime<Utc>)> {
    let (unit, base) = units.split_once(" since ")?;
    let seconds = unit_seconds(&unit.trim().to_lowercase())?;
    let base = base.trim().trim_end_matches('Z').trim_end_matches(" UTC");
    let base = NaiveDateTime::parse_from_str(base, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(base, "%Y-%m-%d %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(base, "%Y-%m-%d").map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .ok()?;
    Some((seconds, Utc.from_utc_datetime(&base)))
}

pub fn cf_to_utc(value: f64, unit_seconds: f64, base: DateTime<Utc>) -> DateTime<Utc> {
    // CF axes are whole seconds in practice; round to keep joins exact.
    base + Duration::seconds((value * unit_seconds).round() as i64)
}
