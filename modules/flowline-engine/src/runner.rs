//! Sequential driver for one flow instance.
//!
//! Each flow gets its own task draining a queue of points. The next point is
//! not attempted until the previous one reached its terminal signal; different
//! flows run in independent tasks.

use anyhow::{anyhow, Result};
use flowline_events::{FlowKey, TimelinePoint};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cancel::CancelHandle;
use crate::flow::Flow;
use crate::scope::{FlowStatus, TopicScope, TurnOutcome};
use crate::traits::Topic;

/// What a runner leaves behind once its flow stops taking points.
#[derive(Debug)]
pub struct RunReport<T> {
    pub flow: Flow<T>,
    /// Points attempted, skipped ones excluded.
    pub processed: usize,
    /// Outcome of the last attempted point, if any.
    pub last: Option<TurnOutcome>,
}

/// Feeds points to a running flow.
pub struct TopicHandle<T: Topic> {
    key: FlowKey,
    tx: mpsc::Sender<TimelinePoint>,
    cancel: CancelHandle,
    status: watch::Receiver<FlowStatus>,
    task: JoinHandle<RunReport<T>>,
}

impl<T: Topic> TopicHandle<T> {
    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    /// Queue a point. Fails once the flow has terminated.
    pub async fn push(&self, point: TimelinePoint) -> Result<()> {
        self.tx
            .send(point)
            .await
            .map_err(|_| anyhow!("flow {} is no longer accepting points", self.key))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn status(&self) -> watch::Receiver<FlowStatus> {
        self.status.clone()
    }

    /// Close the queue and wait for the flow to drain it.
    pub async fn join(self) -> Result<RunReport<T>> {
        drop(self.tx);
        Ok(self.task.await?)
    }
}

/// Spawn a task that owns `scope` and processes queued points in order until
/// the flow terminates or every sender is gone.
pub fn spawn_topic<T: Topic>(scope: TopicScope<T>, capacity: usize) -> TopicHandle<T> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let key = scope.key().clone();
    let cancel = scope.cancel_handle();
    let status = scope.status();
    let task = tokio::spawn(run(scope, rx));

    TopicHandle {
        key,
        tx,
        cancel,
        status,
        task,
    }
}

async fn run<T: Topic>(
    mut scope: TopicScope<T>,
    mut rx: mpsc::Receiver<TimelinePoint>,
) -> RunReport<T> {
    let mut processed = 0;
    let mut last = None;

    while let Some(point) = rx.recv().await {
        let outcome = scope.process(point).await;
        if matches!(outcome, TurnOutcome::Skipped) {
            continue;
        }
        processed += 1;

        let terminal = outcome.is_terminal();
        last = Some(outcome);
        if terminal {
            break;
        }
    }

    debug!(flow = %scope.key(), processed, "[timeline] runner exiting");

    RunReport {
        flow: scope.into_flow(),
        processed,
        last,
    }
}
