//! Core traits for the topic engine.

use anyhow::Result;
use async_trait::async_trait;
use flowline_events::{EventRegistry, FlowKey, NewEvent, TimelinePoint};
use serde::Serialize;

use crate::call::WhenCall;
use crate::flow::{Flow, FlowContext, Verdict};

/// Events carry a type string and know how to serialize for the timeline.
pub trait EventLike: Clone + Send + Sync + 'static {
    /// The identifier the event is registered under.
    fn event_type_str(&self) -> String;

    /// Serialize this event to the JSON payload stored on the timeline.
    fn to_persist_payload(&self) -> serde_json::Value;

    fn to_new_event(&self) -> NewEvent {
        NewEvent::new(self.event_type_str(), self.to_persist_payload())
    }
}

/// A stateful flow advanced one timeline point at a time.
///
/// `given` is the synchronous state mutation. `when` may suspend on I/O,
/// uses the point's scoped dependencies, and emits new events through the
/// call. Both return a [`Verdict`]: a business rejection is a value, a fault
/// is an `Err`.
#[async_trait]
pub trait Topic: Serialize + Send + Sync + 'static {
    type Event: EventLike;
    type Deps: Send + Sync + 'static;

    /// The closed set of events this topic understands.
    fn registry() -> EventRegistry<Self::Event>;

    fn given(
        &mut self,
        _point: &TimelinePoint,
        _event: &Self::Event,
        _ctx: &mut FlowContext,
    ) -> Result<Verdict> {
        Ok(Verdict::Accepted)
    }

    async fn when(
        &mut self,
        _call: &mut WhenCall<'_, Self::Deps, Self::Event>,
        _ctx: &mut FlowContext,
    ) -> Result<Verdict> {
        Ok(Verdict::Accepted)
    }
}

/// Outcome of recording a topic's turn on the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushTopicResult {
    /// The flow rejected the event as a business-rule violation.
    pub given_error: bool,
}

/// The durable, ordered timeline a topic writes its turns to.
///
/// Implemented by `MemoryTimeline` (tests, demo) and by storage adapters.
/// Also implemented for `Arc<P>` so a timeline can be shared for assertions.
#[async_trait]
pub trait Timeline<T: Topic>: Send + Sync {
    /// Record the flow's new state and the events it produced at `point`.
    async fn push_topic(
        &self,
        flow: &Flow<T>,
        point: &TimelinePoint,
        events: &[T::Event],
    ) -> Result<PushTopicResult>;

    /// Record that `flow` stopped at `point` because of `error`.
    ///
    /// `flow` is the flow that stopped, which is not necessarily the one
    /// `point` was addressed to.
    async fn push_stopped(
        &self,
        flow: &FlowKey,
        point: &TimelinePoint,
        error: &anyhow::Error,
    ) -> Result<()>;
}

/// Yields a fresh dependency set for one point.
///
/// The returned value is owned by the point's scope and dropped when the
/// point finishes, on every exit path.
pub trait DependencySource<D>: Send + Sync {
    fn resolve(&self) -> Result<D>;
}

impl<D, F> DependencySource<D> for F
where
    F: Fn() -> Result<D> + Send + Sync,
{
    fn resolve(&self) -> Result<D> {
        self()
    }
}
