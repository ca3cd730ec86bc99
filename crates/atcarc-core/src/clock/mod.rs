//! Segment clock: the fixed 30-minute grid LiveATC archives are cut on.
//!
//! Maps a requested UTC range onto the ordered sequence of segment start
//! times, and formats/parses the date and time-of-day strings used in
//! archive filenames.

mod format;
mod range;

pub use format::{
    format_date, format_time_of_day, parse_date, parse_stamp, parse_time_of_day, single_segment,
};
pub use range::{SegmentClock, SegmentIter, SegmentRequest};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Length of one archive segment in minutes.
pub const SEGMENT_MINUTES: i64 = 30;

const SEGMENT_SECS: i64 = SEGMENT_MINUTES * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("invalid range: end {end} is before start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("invalid date {0:?}, expected Mon-DD-YYYY (e.g. Oct-01-2021)")]
    InvalidDate(String),
    #[error("invalid time {0:?}, expected HHMMZ on the hour or half hour (e.g. 0030Z)")]
    InvalidTime(String),
}

pub fn segment_length() -> Duration {
    Duration::minutes(SEGMENT_MINUTES)
}

/// Drops seconds and sub-second precision.
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(t.timestamp().rem_euclid(60))
        - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// Floors `t` onto the 30-minute grid (10:35:12 -> 10:30:00).
pub fn align_down(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::seconds(t.timestamp().rem_euclid(SEGMENT_SECS))
        - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

pub fn is_aligned(t: DateTime<Utc>) -> bool {
    align_down(t) == t
}

/// Start of the most recent fully archived segment, strictly before `now`.
///
/// 10:35 gives 10:00 (10:30 is still being recorded); 10:00 exactly gives 09:30.
pub fn last_zulu_period(now: DateTime<Utc>) -> DateTime<Utc> {
    align_down(now) - segment_length()
}
