//! Acquisition scheduler.
//!
//! Resolves a station's archive once, then dispatches segment fetches in
//! clock order onto a bounded pool of blocking workers, pacing dispatches to
//! stay under LiveATC's rate limits. Results stream back as typed events and
//! are folded into a `RunSummary` by the dispatcher, which is the only writer.

mod events;
mod pacing;
mod result;
mod run;
mod state;

pub use events::{AcquisitionEvent, Progress};
pub use pacing::Pacing;
pub use result::{truncate_detail, FailureKind, RunSummary, SegmentOutcome, SegmentResult};
pub use run::{AcquireError, Acquisition, RunOptions};
pub use state::RunState;
