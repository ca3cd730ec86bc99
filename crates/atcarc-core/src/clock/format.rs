//! Upstream date/time strings: `Oct-01-2021`, `0030Z`, `Oct-01-2021-0030Z`.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use super::{last_zulu_period, ClockError};

/// `Mon-DD-YYYY` with an English month abbreviation.
pub fn format_date(t: DateTime<Utc>) -> String {
    t.format("%b-%d-%Y").to_string()
}

/// `HHMMZ` in UTC.
pub fn format_time_of_day(t: DateTime<Utc>) -> String {
    t.format("%H%MZ").to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ClockError> {
    NaiveDate::parse_from_str(s.trim(), "%b-%d-%Y")
        .map_err(|_| ClockError::InvalidDate(s.to_string()))
}

/// Parses `HHMMZ` (the `Z` is optional). Minutes must be `00` or `30`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ClockError> {
    let invalid = || ClockError::InvalidTime(s.to_string());
    let trimmed = s.trim();
    let digits = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
        .unwrap_or(trimmed);
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = digits[..2].parse().map_err(|_| invalid())?;
    let minute: u32 = digits[2..].parse().map_err(|_| invalid())?;
    if minute != 0 && minute != 30 {
        return Err(invalid());
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Parses a range endpoint `Mon-DD-YYYY-HHMMZ` (e.g. `Dec-10-2025-0000Z`).
pub fn parse_stamp(s: &str) -> Result<DateTime<Utc>, ClockError> {
    let (date, time) = s
        .trim()
        .rsplit_once('-')
        .ok_or_else(|| ClockError::InvalidDate(s.to_string()))?;
    let date = parse_date(date)?;
    let time = parse_time_of_day(time)?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Picks the segment for a single download from optional date/time arguments.
///
/// Neither given: the last fully archived period. Only a time: today's UTC date.
/// Only a date: the last period's time of day on that date.
pub fn single_segment(
    date: Option<&str>,
    time: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ClockError> {
    let last = last_zulu_period(now);
    let day = match date {
        Some(d) => parse_date(d)?,
        None if time.is_some() => now.date_naive(),
        None => last.date_naive(),
    };
    let time_of_day = match time {
        Some(t) => parse_time_of_day(t)?,
        None => last.time(),
    };
    Ok(Utc.from_utc_datetime(&day.and_time(time_of_day)))
}
