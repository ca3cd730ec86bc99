//! Per-segment outcomes and the run summary they are folded into.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::state::RunState;
use crate::clock::{format_date, format_time_of_day, SegmentRequest};
use crate::fetcher::FetchedSegment;
use crate::retry::{Attempted, FetchError};

/// Error details longer than this are cut and suffixed with `...`.
pub const MAX_DETAIL_CHARS: usize = 100;

pub fn truncate_detail(detail: &str) -> String {
    match detail.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &detail[..cut]),
        None => detail.to_string(),
    }
}

/// Why a segment failed, coarse enough for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Forbidden,
    /// Transient failures used up the retry budget.
    ExhaustedRetries,
    /// Non-retried network or HTTP failure.
    Network,
    Storage,
    /// No usable transport.
    Unavailable,
    /// The worker itself died (panic in a blocking task).
    Internal,
}

impl FailureKind {
    pub fn from_error(e: &FetchError) -> Self {
        match e {
            FetchError::NotFound => FailureKind::NotFound,
            FetchError::Forbidden => FailureKind::Forbidden,
            FetchError::ExhaustedRetries { .. } => FailureKind::ExhaustedRetries,
            FetchError::Storage(_) => FailureKind::Storage,
            FetchError::Unavailable { .. } => FailureKind::Unavailable,
            FetchError::Connection(_)
            | FetchError::Timeout(_)
            | FetchError::Transfer(_)
            | FetchError::Http(_) => FailureKind::Network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Success {
        path: PathBuf,
        filename: String,
        attempts: u32,
    },
    Failure {
        kind: FailureKind,
        detail: String,
        attempts: u32,
    },
    /// Never started because the run was cancelled.
    Cancelled,
}

/// Outcome of one `SegmentRequest`, tagged with its index in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentResult {
    pub index: usize,
    pub time: DateTime<Utc>,
    pub outcome: SegmentOutcome,
}

impl SegmentResult {
    pub fn from_attempt(request: &SegmentRequest, attempted: Attempted<FetchedSegment>) -> Self {
        let outcome = match attempted.result {
            Ok(seg) => SegmentOutcome::Success {
                path: seg.path,
                filename: seg.filename,
                attempts: attempted.attempts,
            },
            Err(e) => SegmentOutcome::Failure {
                kind: FailureKind::from_error(&e),
                detail: truncate_detail(&e.to_string()),
                attempts: attempted.attempts,
            },
        };
        Self {
            index: request.index,
            time: request.time,
            outcome,
        }
    }

    pub fn cancelled(request: &SegmentRequest) -> Self {
        Self {
            index: request.index,
            time: request.time,
            outcome: SegmentOutcome::Cancelled,
        }
    }

    pub fn internal_failure(request: &SegmentRequest, detail: &str) -> Self {
        Self {
            index: request.index,
            time: request.time,
            outcome: SegmentOutcome::Failure {
                kind: FailureKind::Internal,
                detail: truncate_detail(detail),
                attempts: 0,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Failure { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Cancelled)
    }

    pub fn date(&self) -> String {
        format_date(self.time)
    }

    pub fn time_of_day(&self) -> String {
        format_time_of_day(self.time)
    }
}

/// Aggregated outcome of a run. `results` is ordered by index once finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub results: Vec<SegmentResult>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            state: RunState::Idle,
            total,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            results: Vec::with_capacity(total),
        }
    }

    pub fn record(&mut self, result: SegmentResult) {
        match result.outcome {
            SegmentOutcome::Success { .. } => self.succeeded += 1,
            SegmentOutcome::Failure { .. } => self.failed += 1,
            SegmentOutcome::Cancelled => self.cancelled += 1,
        }
        self.results.push(result);
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub(crate) fn finish(&mut self, state: RunState) {
        self.results.sort_by_key(|r| r.index);
        self.state = state;
    }

    pub fn failures(&self) -> impl Iterator<Item = &SegmentResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}
