//! The flow being advanced: topic state plus its processing context.

use std::collections::BTreeMap;
use std::fmt;

use flowline_events::{FlowKey, TimelinePosition};
use serde::Serialize;

/// A business-rule rejection. Returned by handlers, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected: {}", self.reason)
    }
}

/// What a handler decided about the event it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn reject(reason: impl Into<String>) -> Self {
        Verdict::Rejected(Rejection::new(reason))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected(_))
    }
}

/// An error recorded against the position it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowError {
    pub message: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl FlowError {
    fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}

/// Processing state of a flow, separate from its domain state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowContext {
    done: bool,
    last_position: Option<TimelinePosition>,
    errors: BTreeMap<TimelinePosition, FlowError>,
    rejections: BTreeMap<TimelinePosition, Rejection>,
}

impl FlowContext {
    /// Mark the flow as having reached a terminal business state.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Record `error` at `position`. Records at other positions are kept.
    pub fn set_error(&mut self, position: TimelinePosition, error: &anyhow::Error) {
        self.errors.insert(position, FlowError::from_anyhow(error));
    }

    pub fn error_at(&self, position: TimelinePosition) -> Option<&FlowError> {
        self.errors.get(&position)
    }

    pub fn errors(&self) -> &BTreeMap<TimelinePosition, FlowError> {
        &self.errors
    }

    pub fn reject(&mut self, position: TimelinePosition, rejection: Rejection) {
        self.rejections.insert(position, rejection);
    }

    pub fn rejection_at(&self, position: TimelinePosition) -> Option<&Rejection> {
        self.rejections.get(&position)
    }

    /// Last position whose turn reached the timeline.
    pub fn last_position(&self) -> Option<TimelinePosition> {
        self.last_position
    }

    pub(crate) fn advance(&mut self, position: TimelinePosition) {
        self.last_position = Some(position);
    }
}

/// A flow instance: identity, topic state and processing context.
#[derive(Debug)]
pub struct Flow<T> {
    key: FlowKey,
    topic: T,
    context: FlowContext,
}

impl<T> Flow<T> {
    pub fn new(key: FlowKey, topic: T) -> Self {
        Self::with_context(key, topic, FlowContext::default())
    }

    /// Resume a flow whose context was rebuilt from the timeline.
    pub fn with_context(key: FlowKey, topic: T, context: FlowContext) -> Self {
        Self {
            key,
            topic,
            context,
        }
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn topic(&self) -> &T {
        &self.topic
    }

    pub fn topic_mut(&mut self) -> &mut T {
        &mut self.topic
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    /// Split borrow for handler calls: the topic mutates itself and its context.
    pub(crate) fn parts_mut(&mut self) -> (&mut T, &mut FlowContext) {
        (&mut self.topic, &mut self.context)
    }
}
