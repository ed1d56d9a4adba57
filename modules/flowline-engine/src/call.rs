//! Handler call descriptions.
//!
//! A call binds one point and its decoded event to the topic handler that
//! should see it. `WhenCall` also carries the point's scoped dependencies,
//! the flow's cancellation signal, and collects the events the handler emits.

use anyhow::Result;
use flowline_events::TimelinePoint;
use tracing::trace;

use crate::cancel::CancelSignal;
use crate::deps::ScopedDependencies;
use crate::flow::{Flow, Verdict};
use crate::traits::Topic;

/// Synchronous state mutation for one point.
pub struct GivenCall<'a, E> {
    point: &'a TimelinePoint,
    event: &'a E,
}

impl<'a, E> GivenCall<'a, E> {
    pub fn new(point: &'a TimelinePoint, event: &'a E) -> Self {
        Self { point, event }
    }

    pub fn make<T>(self, flow: &mut Flow<T>) -> Result<Verdict>
    where
        T: Topic<Event = E>,
    {
        trace!(flow = %flow.key(), position = %self.point.position, "[timeline] given");
        let (topic, ctx) = flow.parts_mut();
        topic.given(self.point, self.event, ctx)
    }
}

/// Asynchronous handler call for one point; the only producer of new events.
pub struct WhenCall<'a, D, E> {
    point: &'a TimelinePoint,
    event: &'a E,
    deps: &'a ScopedDependencies<D>,
    cancel: CancelSignal,
    new_events: Vec<E>,
}

impl<'a, D, E> WhenCall<'a, D, E> {
    pub fn new(
        point: &'a TimelinePoint,
        event: &'a E,
        deps: &'a ScopedDependencies<D>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            point,
            event,
            deps,
            cancel,
            new_events: Vec::new(),
        }
    }

    pub fn point(&self) -> &TimelinePoint {
        self.point
    }

    pub fn event(&self) -> &E {
        self.event
    }

    /// Dependencies resolved for this point only.
    pub fn deps(&self) -> &D {
        self.deps
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn emit(&mut self, event: E) {
        self.new_events.push(event);
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = E>) {
        self.new_events.extend(events);
    }

    /// Events emitted so far, in emission order.
    pub fn new_events(&self) -> &[E] {
        &self.new_events
    }

    pub fn into_new_events(self) -> Vec<E> {
        self.new_events
    }
}

impl<'a, D, E> WhenCall<'a, D, E>
where
    D: Send + Sync + 'static,
    E: crate::traits::EventLike,
{
    pub async fn make<T>(&mut self, flow: &mut Flow<T>) -> Result<Verdict>
    where
        T: Topic<Event = E, Deps = D>,
    {
        trace!(flow = %flow.key(), position = %self.point.position, "[timeline] when");
        let (topic, ctx) = flow.parts_mut();
        topic.when(self, ctx).await
    }
}
