//! Typed progress events streamed to whatever presents the run.

use chrono::{DateTime, Utc};

use super::result::{RunSummary, SegmentResult};
use super::state::RunState;
use crate::discovery::ArchiveTarget;

/// Running counts, enough to render `k of N processed, M succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Progress {
    pub fn of(summary: &RunSummary) -> Self {
        Self {
            processed: summary.processed(),
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// Archive resolved; dispatch is about to begin.
    Started {
        station: String,
        archive: ArchiveTarget,
        total: usize,
    },
    Dispatched {
        index: usize,
        time: DateTime<Utc>,
    },
    /// Emitted in completion order; `result.index` ties it back to the request.
    SegmentFinished {
        result: SegmentResult,
        progress: Progress,
    },
    Finished {
        state: RunState,
        progress: Progress,
    },
}
