//! Range decomposition into segment start times and per-segment requests.

use chrono::{DateTime, Utc};

use super::{align_down, format_date, format_time_of_day, segment_length, truncate_to_minute};
use super::ClockError;

/// A validated `[start, end]` range on the 30-minute grid.
///
/// Cheap to copy; every `iter()` starts over from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentClock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SegmentClock {
    /// Both ends are truncated to the minute; `start` is then floored onto the grid.
    /// Fails with `InvalidRange` when `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ClockError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if end < start {
            return Err(ClockError::InvalidRange { start, end });
        }
        Ok(Self {
            start: align_down(start),
            end,
        })
    }

    /// Clock covering exactly one segment.
    pub fn single(at: DateTime<Utc>) -> Self {
        let start = align_down(at);
        Self { start, end: start }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn iter(&self) -> SegmentIter {
        SegmentIter {
            next: Some(self.start),
            end: self.end,
        }
    }

    /// Number of segment times in the range.
    pub fn len(&self) -> usize {
        let span = (self.end - self.start).num_minutes();
        (span / super::SEGMENT_MINUTES) as usize + 1
    }

    /// Never true: a valid clock always covers at least its start segment.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Materializes the range as requests for `station`, indexed densely from 0.
    pub fn requests(&self, station: &str) -> Vec<SegmentRequest> {
        self.iter()
            .enumerate()
            .map(|(index, time)| SegmentRequest {
                station: station.to_string(),
                time,
                index,
            })
            .collect()
    }
}

impl IntoIterator for SegmentClock {
    type Item = DateTime<Utc>;
    type IntoIter = SegmentIter;

    fn into_iter(self) -> SegmentIter {
        self.iter()
    }
}

/// Lazy iterator over segment start times, `start, start+30m, ...` while `<= end`.
#[derive(Debug, Clone)]
pub struct SegmentIter {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
}

impl Iterator for SegmentIter {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = current.checked_add_signed(segment_length());
        Some(current)
    }
}

/// One segment to fetch: station, aligned start time, position within the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRequest {
    pub station: String,
    pub time: DateTime<Utc>,
    pub index: usize,
}

impl SegmentRequest {
    /// Archive date component, e.g. `Oct-01-2021`.
    pub fn date(&self) -> String {
        format_date(self.time)
    }

    /// Archive time-of-day component, e.g. `0030Z`.
    pub fn time_of_day(&self) -> String {
        format_time_of_day(self.time)
    }
}
