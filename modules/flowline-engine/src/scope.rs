//! The topic scope: advances one flow by one timeline point at a time.
//!
//! Given → when → push on the happy path. Any fault short-circuits into
//! recording a stop on the timeline; if that fails too, both errors are
//! surfaced together as [`StopFailed`].

use std::sync::Arc;

use anyhow::{bail, Result};
use flowline_events::{EventRegistry, FlowKey, TimelinePoint, TimelinePosition};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::call::{GivenCall, WhenCall};
use crate::cancel::CancelHandle;
use crate::deps::ScopedDependencies;
use crate::error::StopFailed;
use crate::flow::{Flow, Verdict};
use crate::traits::{DependencySource, PushTopicResult, Timeline, Topic};

/// Why a flow finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The flow reached its terminal business state.
    Done,
    /// The flow rejected the event as a business-rule violation.
    GivenRejected,
}

/// Where a flow stands, as seen by whoever drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    Running,
    Finished(FinishReason),
    Stopped {
        position: TimelinePosition,
        message: String,
    },
    Fatal {
        position: TimelinePosition,
        message: String,
    },
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowStatus::Running)
    }
}

/// The single signal produced for each processed point.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The turn reached the timeline; the flow keeps going.
    Continued,
    /// The turn reached the timeline and the flow is finished.
    Finished(FinishReason),
    /// The turn failed and the stop was recorded at `position`.
    Stopped {
        position: TimelinePosition,
        error: anyhow::Error,
    },
    /// The turn failed and recording the stop failed as well.
    Fatal(StopFailed),
    /// The flow had already terminated; the point was not attempted.
    ///
    /// Not a completion of the point: neither success nor error was
    /// signaled for it, and nothing reached the timeline. The completion
    /// that ended the flow was reported by an earlier point.
    Skipped,
}

impl TurnOutcome {
    /// Whether the flow accepts no further points after this outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnOutcome::Continued)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TurnOutcome::Stopped { .. } | TurnOutcome::Fatal(_))
    }
}

/// The scope of one topic's activity on the timeline.
///
/// Owns the flow exclusively: `process` takes `&mut self`, so one point is
/// in flight per flow instance.
pub struct TopicScope<T: Topic> {
    flow: Flow<T>,
    registry: EventRegistry<T::Event>,
    timeline: Arc<dyn Timeline<T>>,
    deps: Arc<dyn DependencySource<T::Deps>>,
    cancel: CancelHandle,
    status: watch::Sender<FlowStatus>,
}

impl<T: Topic> TopicScope<T> {
    pub fn new(
        flow: Flow<T>,
        timeline: impl Timeline<T> + 'static,
        deps: impl DependencySource<T::Deps> + 'static,
    ) -> Self {
        let (status, _rx) = watch::channel(FlowStatus::Running);
        Self {
            flow,
            registry: T::registry(),
            timeline: Arc::new(timeline),
            deps: Arc::new(deps),
            cancel: CancelHandle::new(),
            status,
        }
    }

    pub fn key(&self) -> &FlowKey {
        self.flow.key()
    }

    pub fn flow(&self) -> &Flow<T> {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut Flow<T> {
        &mut self.flow
    }

    pub fn into_flow(self) -> Flow<T> {
        self.flow
    }

    /// Handle for cancelling this flow's in-progress and future handler calls.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Observe the flow's status; changes once, when the flow terminates.
    pub fn status(&self) -> watch::Receiver<FlowStatus> {
        self.status.subscribe()
    }

    pub fn is_terminated(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    /// Advance the flow by one point. Returns once the point's processing
    /// has reached its terminal signal; never returns a raw handler fault.
    pub async fn process(&mut self, point: TimelinePoint) -> TurnOutcome {
        debug!(position = %point.position, flow = %self.flow.key(), "[timeline] point => flow");

        if self.is_terminated() {
            warn!(
                position = %point.position,
                flow = %self.flow.key(),
                "[timeline] flow already terminated, skipping point"
            );
            return TurnOutcome::Skipped;
        }

        match self.call_and_push_topic(&point).await {
            Ok(None) => TurnOutcome::Continued,
            Ok(Some(reason)) => {
                info!(
                    position = %point.position,
                    flow = %self.flow.key(),
                    reason = ?reason,
                    "[timeline] flow finished"
                );
                self.complete(FlowStatus::Finished(reason));
                TurnOutcome::Finished(reason)
            }
            Err(error) => self.push_stopped(&point, error).await,
        }
    }

    async fn call_and_push_topic(&mut self, point: &TimelinePoint) -> Result<Option<FinishReason>> {
        if point.flow != *self.flow.key() {
            bail!("point for {} was routed to {}", point.flow, self.flow.key());
        }

        let event = self.registry.decode(&point.event)?;

        // Dropped on every exit from this function, before any stop is pushed.
        let deps = ScopedDependencies::resolve(self.deps.as_ref(), point.position)?;

        self.try_call_given(point, &event)?;

        let new_events = self.try_call_when(point, &event, &deps).await?;

        let result = self
            .timeline
            .push_topic(&self.flow, point, &new_events)
            .await?;

        self.flow.context_mut().advance(point.position);

        Ok(finish_reason(result, self.flow.context().is_done()))
    }

    fn try_call_given(&mut self, point: &TimelinePoint, event: &T::Event) -> Result<()> {
        // With `when` routed, mutation happens inside the when call alongside
        // event production.
        if point.route.given && !point.route.when {
            let verdict = GivenCall::new(point, event).make(&mut self.flow)?;
            self.record_verdict(point, verdict);
        }
        Ok(())
    }

    async fn try_call_when(
        &mut self,
        point: &TimelinePoint,
        event: &T::Event,
        deps: &ScopedDependencies<T::Deps>,
    ) -> Result<Vec<T::Event>> {
        if !point.route.when {
            return Ok(Vec::new());
        }

        let mut call = WhenCall::new(point, event, deps, self.cancel.signal());
        let verdict = call.make(&mut self.flow).await?;
        self.record_verdict(point, verdict);

        Ok(call.into_new_events())
    }

    fn record_verdict(&mut self, point: &TimelinePoint, verdict: Verdict) {
        if let Verdict::Rejected(rejection) = verdict {
            debug!(
                position = %point.position,
                flow = %self.flow.key(),
                reason = %rejection.reason,
                "[timeline] event rejected"
            );
            self.flow.context_mut().reject(point.position, rejection);
        }
    }

    async fn push_stopped(&mut self, point: &TimelinePoint, error: anyhow::Error) -> TurnOutcome {
        error!(
            position = %point.position,
            flow = %self.flow.key(),
            error = %format!("{error:#}"),
            "[timeline] flow stopped"
        );

        self.flow.context_mut().set_error(point.position, &error);

        match self
            .timeline
            .push_stopped(self.flow.key(), point, &error)
            .await
        {
            Ok(()) => {
                self.complete(FlowStatus::Stopped {
                    position: point.position,
                    message: error.to_string(),
                });
                TurnOutcome::Stopped {
                    position: point.position,
                    error,
                }
            }
            Err(stop_error) => {
                error!(
                    fatal = true,
                    position = %point.position,
                    flow = %self.flow.key(),
                    error = %format!("{stop_error:#}"),
                    "[timeline] failed to push flow:stopped to timeline"
                );
                let fault = StopFailed::new(point.position, error, stop_error);
                self.complete(FlowStatus::Fatal {
                    position: point.position,
                    message: fault.to_string(),
                });
                TurnOutcome::Fatal(fault)
            }
        }
    }

    fn complete(&self, status: FlowStatus) {
        self.status.send_replace(status);
    }
}

/// Rejection wins when both conditions hold.
fn finish_reason(result: PushTopicResult, done: bool) -> Option<FinishReason> {
    if result.given_error {
        Some(FinishReason::GivenRejected)
    } else if done {
        Some(FinishReason::Done)
    } else {
        None
    }
}
