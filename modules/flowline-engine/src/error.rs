//! Typed errors for topic processing.

use flowline_events::TimelinePosition;
use thiserror::Error;

/// Returned by `CancelSignal::check` once the flow was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("flow processing cancelled")]
pub struct Cancelled;

/// A flow failed, and recording that failure on the timeline failed too.
///
/// Both errors are kept. The timeline no longer reflects the flow's true
/// state, so this is escalated instead of recovered.
#[derive(Debug, Error)]
#[error("flow failed at {position} ({original}) and its stop could not be recorded: {stop_error}")]
pub struct StopFailed {
    pub position: TimelinePosition,
    #[source]
    pub original: anyhow::Error,
    pub stop_error: anyhow::Error,
}

impl StopFailed {
    pub fn new(
        position: TimelinePosition,
        original: anyhow::Error,
        stop_error: anyhow::Error,
    ) -> Self {
        Self {
            position,
            original,
            stop_error,
        }
    }

    /// Both causes, original first.
    pub fn errors(&self) -> [&anyhow::Error; 2] {
        [&self.original, &self.stop_error]
    }
}
