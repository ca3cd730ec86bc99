/// Lifecycle of one acquisition run: `Idle → Running → {Completed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Every request has a real outcome and no cancellation was seen.
    Completed,
    /// Cancellation arrived while segments were still outstanding.
    Cancelled,
}
