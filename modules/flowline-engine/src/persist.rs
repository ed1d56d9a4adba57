//! Timeline implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowline_events::{FlowKey, NewEvent, TimelinePoint, TimelinePosition};
use serde::Serialize;
use thiserror::Error;

use crate::flow::Flow;
use crate::traits::{EventLike, PushTopicResult, Timeline, Topic};

/// A write the timeline refused because it would break the flow's history.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineConflict {
    #[error("ordering conflict for {flow}: {position} is not after {head}")]
    OutOfOrder {
        flow: FlowKey,
        position: TimelinePosition,
        head: TimelinePosition,
    },

    #[error("flow {flow} already stopped at {stopped_at}")]
    AlreadyStopped {
        flow: FlowKey,
        stopped_at: TimelinePosition,
    },
}

/// One entry on the in-memory timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineRecord {
    Topic {
        flow: FlowKey,
        position: TimelinePosition,
        state: serde_json::Value,
        events: Vec<NewEvent>,
        given_error: bool,
        recorded_at: DateTime<Utc>,
    },
    Stopped {
        flow: FlowKey,
        position: TimelinePosition,
        error: String,
        recorded_at: DateTime<Utc>,
    },
}

impl TimelineRecord {
    pub fn flow(&self) -> &FlowKey {
        match self {
            TimelineRecord::Topic { flow, .. } | TimelineRecord::Stopped { flow, .. } => flow,
        }
    }

    pub fn position(&self) -> TimelinePosition {
        match self {
            TimelineRecord::Topic { position, .. } | TimelineRecord::Stopped { position, .. } => {
                *position
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TimelineRecord::Stopped { .. })
    }
}

// ---------------------------------------------------------------------------
// MemoryTimeline (tests, demo; no storage required)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    records: Vec<TimelineRecord>,
    heads: HashMap<FlowKey, TimelinePosition>,
    stopped: HashMap<FlowKey, TimelinePosition>,
}

/// In-memory timeline. Keeps every topic turn and stop in push order and
/// refuses writes that would reorder or extend a stopped flow. Thread-safe.
#[derive(Default)]
pub struct MemoryTimeline {
    inner: Mutex<Inner>,
}

impl MemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All records, in push order.
    pub fn records(&self) -> Vec<TimelineRecord> {
        self.lock().records.clone()
    }

    pub fn records_for(&self, flow: &FlowKey) -> Vec<TimelineRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.flow() == flow)
            .cloned()
            .collect()
    }

    /// Every event a flow produced, in timeline order.
    pub fn events_for(&self, flow: &FlowKey) -> Vec<NewEvent> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.flow() == flow)
            .filter_map(|r| match r {
                TimelineRecord::Topic { events, .. } => Some(events.clone()),
                TimelineRecord::Stopped { .. } => None,
            })
            .flatten()
            .collect()
    }

    /// Last position a topic turn was recorded at for `flow`.
    pub fn head(&self, flow: &FlowKey) -> Option<TimelinePosition> {
        self.lock().heads.get(flow).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}

#[async_trait]
impl<T: Topic> Timeline<T> for MemoryTimeline {
    async fn push_topic(
        &self,
        flow: &Flow<T>,
        point: &TimelinePoint,
        events: &[T::Event],
    ) -> Result<PushTopicResult> {
        let state = serde_json::to_value(flow.topic())?;
        let given_error = flow.context().rejection_at(point.position).is_some();

        let mut inner = self.lock();
        let key = flow.key();

        if let Some(&stopped_at) = inner.stopped.get(key) {
            return Err(TimelineConflict::AlreadyStopped {
                flow: key.clone(),
                stopped_at,
            }
            .into());
        }
        if let Some(&head) = inner.heads.get(key) {
            if point.position <= head {
                return Err(TimelineConflict::OutOfOrder {
                    flow: key.clone(),
                    position: point.position,
                    head,
                }
                .into());
            }
        }

        inner.heads.insert(key.clone(), point.position);
        inner.records.push(TimelineRecord::Topic {
            flow: key.clone(),
            position: point.position,
            state,
            events: events.iter().map(EventLike::to_new_event).collect(),
            given_error,
            recorded_at: Utc::now(),
        });

        Ok(PushTopicResult { given_error })
    }

    async fn push_stopped(
        &self,
        flow: &FlowKey,
        point: &TimelinePoint,
        error: &anyhow::Error,
    ) -> Result<()> {
        let mut inner = self.lock();

        if let Some(&stopped_at) = inner.stopped.get(flow) {
            return Err(TimelineConflict::AlreadyStopped {
                flow: flow.clone(),
                stopped_at,
            }
            .into());
        }

        inner.stopped.insert(flow.clone(), point.position);
        inner.records.push(TimelineRecord::Stopped {
            flow: flow.clone(),
            position: point.position,
            error: format!("{error:#}"),
            recorded_at: Utc::now(),
        });

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Arc<P> blanket: lets tests share the timeline for assertions
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: Topic, P: Timeline<T> + ?Sized> Timeline<T> for Arc<P> {
    async fn push_topic(
        &self,
        flow: &Flow<T>,
        point: &TimelinePoint,
        events: &[T::Event],
    ) -> Result<PushTopicResult> {
        (**self).push_topic(flow, point, events).await
    }

    async fn push_stopped(
        &self,
        flow: &FlowKey,
        point: &TimelinePoint,
        error: &anyhow::Error,
    ) -> Result<()> {
        (**self).push_stopped(flow, point, error).await
    }
}
