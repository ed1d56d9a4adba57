//! Shared fixtures: a scriptable topic, a fault-injecting timeline and a
//! dependency source that counts acquisitions and releases.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use flowline_engine::{
    DependencySource, EventLike, Flow, FlowContext, MemoryTimeline, PushTopicResult, Timeline,
    Topic, TopicScope, Verdict, WhenCall,
};
use flowline_events::{
    EventRegistry, FlowKey, RawEvent, RoutePolicy, TimelinePoint, TimelinePosition,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Typed faults
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
#[error("invalid operation: {0}")]
pub struct InvalidOperation(pub String);

#[derive(Debug, Error)]
#[error("conflict at {0}")]
pub struct ConflictError(pub TimelinePosition);

#[derive(Debug, Error)]
#[error("storage unavailable")]
pub struct StorageUnavailable;

// ---------------------------------------------------------------------------
// Test events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mutate {
    pub by: i64,
    #[serde(default)]
    pub emit: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fail {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reject {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finish {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitCancel {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Produced {
    pub label: String,
}

#[derive(Debug, Clone)]
pub enum TestEvent {
    Mutate(Mutate),
    Fail(Fail),
    Reject(Reject),
    Finish(Finish),
    AwaitCancel(AwaitCancel),
    Produced(Produced),
}

impl EventLike for TestEvent {
    fn event_type_str(&self) -> String {
        match self {
            TestEvent::Mutate(_) => "test:mutate".into(),
            TestEvent::Fail(_) => "test:fail".into(),
            TestEvent::Reject(_) => "test:reject".into(),
            TestEvent::Finish(_) => "test:finish".into(),
            TestEvent::AwaitCancel(_) => "test:await-cancel".into(),
            TestEvent::Produced(_) => "test:produced".into(),
        }
    }

    fn to_persist_payload(&self) -> serde_json::Value {
        match self {
            TestEvent::Mutate(e) => serde_json::to_value(e),
            TestEvent::Fail(e) => serde_json::to_value(e),
            TestEvent::Reject(e) => serde_json::to_value(e),
            TestEvent::Finish(e) => serde_json::to_value(e),
            TestEvent::AwaitCancel(e) => serde_json::to_value(e),
            TestEvent::Produced(e) => serde_json::to_value(e),
        }
        .expect("TestEvent serialization should never fail")
    }
}

// ---------------------------------------------------------------------------
// Dependency tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Tracker {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl Tracker {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }
}

pub struct TrackedDeps {
    pub tracker: Arc<Tracker>,
}

impl Drop for TrackedDeps {
    fn drop(&mut self) {
        self.tracker.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TrackingSource {
    pub tracker: Arc<Tracker>,
}

impl DependencySource<TrackedDeps> for TrackingSource {
    fn resolve(&self) -> Result<TrackedDeps> {
        self.tracker.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedDeps {
            tracker: self.tracker.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Scriptable topic
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
pub struct TestTopic {
    pub value: i64,
    pub given_calls: usize,
    pub when_calls: usize,
    /// Live dependency scopes seen from inside each when call.
    pub live_deps_in_when: Vec<usize>,
}

#[async_trait]
impl Topic for TestTopic {
    type Event = TestEvent;
    type Deps = TrackedDeps;

    fn registry() -> EventRegistry<TestEvent> {
        EventRegistry::new()
            .register("test:mutate", TestEvent::Mutate)
            .register("test:fail", TestEvent::Fail)
            .register("test:reject", TestEvent::Reject)
            .register("test:finish", TestEvent::Finish)
            .register("test:await-cancel", TestEvent::AwaitCancel)
            .register("test:produced", TestEvent::Produced)
    }

    fn given(
        &mut self,
        _point: &TimelinePoint,
        event: &TestEvent,
        ctx: &mut FlowContext,
    ) -> Result<Verdict> {
        self.given_calls += 1;
        match event {
            TestEvent::Mutate(m) => self.value += m.by,
            TestEvent::Fail(f) => return Err(InvalidOperation(f.message.clone()).into()),
            TestEvent::Reject(r) => return Ok(Verdict::reject(r.reason.clone())),
            TestEvent::Finish(_) => ctx.set_done(),
            TestEvent::AwaitCancel(_) | TestEvent::Produced(_) => {}
        }
        Ok(Verdict::Accepted)
    }

    async fn when(
        &mut self,
        call: &mut WhenCall<'_, TrackedDeps, TestEvent>,
        ctx: &mut FlowContext,
    ) -> Result<Verdict> {
        self.when_calls += 1;
        self.live_deps_in_when.push(call.deps().tracker.live());

        match call.event().clone() {
            TestEvent::Mutate(m) => {
                self.value += m.by;
                call.emit_all(
                    m.emit
                        .into_iter()
                        .map(|label| TestEvent::Produced(Produced { label })),
                );
            }
            TestEvent::Fail(f) => return Err(InvalidOperation(f.message).into()),
            TestEvent::Reject(r) => return Ok(Verdict::reject(r.reason)),
            TestEvent::Finish(_) => ctx.set_done(),
            TestEvent::AwaitCancel(_) => {
                call.cancel().cancelled().await;
                call.cancel().check()?;
            }
            TestEvent::Produced(_) => {}
        }
        Ok(Verdict::Accepted)
    }
}

// ---------------------------------------------------------------------------
// Fault-injecting timeline
// ---------------------------------------------------------------------------

/// Wraps `MemoryTimeline`, failing pushes on demand.
#[derive(Default)]
pub struct FaultyTimeline {
    pub inner: MemoryTimeline,
    fail_topic_at: Mutex<HashSet<TimelinePosition>>,
    fail_stopped: Mutex<bool>,
    pub topic_pushes: AtomicUsize,
    pub stopped_pushes: AtomicUsize,
}

impl FaultyTimeline {
    pub fn fail_topic_at(&self, position: TimelinePosition) {
        self.fail_topic_at.lock().unwrap().insert(position);
    }

    pub fn fail_stopped(&self) {
        *self.fail_stopped.lock().unwrap() = true;
    }

    pub fn topic_pushes(&self) -> usize {
        self.topic_pushes.load(Ordering::SeqCst)
    }

    pub fn stopped_pushes(&self) -> usize {
        self.stopped_pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Topic> Timeline<T> for FaultyTimeline {
    async fn push_topic(
        &self,
        flow: &Flow<T>,
        point: &TimelinePoint,
        events: &[T::Event],
    ) -> Result<PushTopicResult> {
        self.topic_pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_topic_at.lock().unwrap().contains(&point.position) {
            return Err(ConflictError(point.position).into());
        }
        self.inner.push_topic(flow, point, events).await
    }

    async fn push_stopped(
        &self,
        flow: &FlowKey,
        point: &TimelinePoint,
        error: &anyhow::Error,
    ) -> Result<()> {
        self.stopped_pushes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_stopped.lock().unwrap() {
            return Err(StorageUnavailable.into());
        }
        Timeline::<T>::push_stopped(&self.inner, flow, point, error).await
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Collects formatted `tracing` output so tests can assert on diagnostics.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A plain-text subscriber writing into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn key() -> FlowKey {
    FlowKey::new("test", "flow-1")
}

pub fn point(seq: i64, route: RoutePolicy, event_type: &str, payload: serde_json::Value) -> TimelinePoint {
    TimelinePoint::new(
        TimelinePosition::new(seq),
        key(),
        route,
        RawEvent::new(event_type, payload),
    )
}

pub fn mutate(seq: i64, route: RoutePolicy, by: i64, emit: &[&str]) -> TimelinePoint {
    point(seq, route, "test:mutate", json!({ "by": by, "emit": emit }))
}

pub fn fail(seq: i64, route: RoutePolicy, message: &str) -> TimelinePoint {
    point(seq, route, "test:fail", json!({ "message": message }))
}

pub fn reject(seq: i64, route: RoutePolicy, reason: &str) -> TimelinePoint {
    point(seq, route, "test:reject", json!({ "reason": reason }))
}

pub fn finish(seq: i64, route: RoutePolicy) -> TimelinePoint {
    point(seq, route, "test:finish", json!({}))
}

pub struct Harness {
    pub scope: TopicScope<TestTopic>,
    pub timeline: Arc<FaultyTimeline>,
    pub tracker: Arc<Tracker>,
}

pub fn harness() -> Harness {
    let timeline = Arc::new(FaultyTimeline::default());
    let tracker = Arc::new(Tracker::default());
    let scope = TopicScope::new(
        Flow::new(key(), TestTopic::default()),
        timeline.clone(),
        TrackingSource {
            tracker: tracker.clone(),
        },
    );
    Harness {
        scope,
        timeline,
        tracker,
    }
}

pub fn labels(events: &[flowline_events::NewEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.payload["label"].as_str().unwrap_or_default().to_string())
        .collect()
}
