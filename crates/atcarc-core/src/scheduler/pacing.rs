//! Dispatch pacing: how long to hold back before starting the next fetch.

use std::time::Duration;

/// With one worker the full delay is waited after each completion; with N
/// workers successive dispatches are staggered by `delay / N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    delay: Duration,
    concurrency: usize,
}

impl Pacing {
    pub fn new(delay: Duration, concurrency: usize) -> Self {
        Self {
            delay,
            concurrency: concurrency.max(1),
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.concurrency == 1
    }

    /// Minimum spacing between two dispatches (concurrent mode only).
    pub fn submission_gap(&self) -> Duration {
        if self.is_sequential() {
            Duration::ZERO
        } else {
            self.delay / self.concurrency as u32
        }
    }

    /// Wait after a completion before the next dispatch (sequential mode only).
    pub fn completion_gap(&self) -> Duration {
        if self.is_sequential() {
            self.delay
        } else {
            Duration::ZERO
        }
    }
}
