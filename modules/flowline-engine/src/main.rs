use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use flowline_engine::{
    logging, spawn_topic, EngineConfig, EventLike, Flow, FlowContext, MemoryTimeline, Topic,
    TopicScope, Verdict, WhenCall,
};
use flowline_events::{EventRegistry, FlowKey, RawEvent, RoutePolicy, TimelinePoint, TimelinePosition};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tally topic: sums counts until a limit, then announces it and finishes.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Counted {
    amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LimitReached {
    total: u64,
}

#[derive(Debug, Clone)]
enum TallyEvent {
    Counted(Counted),
    LimitReached(LimitReached),
}

impl EventLike for TallyEvent {
    fn event_type_str(&self) -> String {
        match self {
            TallyEvent::Counted(_) => "tally:counted".into(),
            TallyEvent::LimitReached(_) => "tally:limit-reached".into(),
        }
    }

    fn to_persist_payload(&self) -> serde_json::Value {
        match self {
            TallyEvent::Counted(e) => serde_json::to_value(e),
            TallyEvent::LimitReached(e) => serde_json::to_value(e),
        }
        .expect("TallyEvent serialization should never fail")
    }
}

struct DemoDeps {
    run_id: Uuid,
}

#[derive(Debug, Serialize)]
struct Tally {
    total: u64,
    limit: u64,
}

#[async_trait]
impl Topic for Tally {
    type Event = TallyEvent;
    type Deps = DemoDeps;

    fn registry() -> EventRegistry<TallyEvent> {
        EventRegistry::new()
            .register("tally:counted", TallyEvent::Counted)
            .register("tally:limit-reached", TallyEvent::LimitReached)
    }

    async fn when(
        &mut self,
        call: &mut WhenCall<'_, DemoDeps, TallyEvent>,
        ctx: &mut FlowContext,
    ) -> Result<Verdict> {
        call.cancel().check()?;

        let TallyEvent::Counted(counted) = call.event() else {
            return Ok(Verdict::Accepted);
        };
        if counted.amount == 0 {
            return Ok(Verdict::reject("zero counts are not recorded"));
        }

        self.total += counted.amount;
        info!(run_id = %call.deps().run_id, total = self.total, "Counted");

        if self.total >= self.limit {
            call.emit(TallyEvent::LimitReached(LimitReached { total: self.total }));
            ctx.set_done();
        }
        Ok(Verdict::Accepted)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env()?;
    logging::init(&config)?;
    config.log_summary();

    let limit: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 10,
    };

    let run_id = Uuid::new_v4();
    let key = FlowKey::new("tally", run_id.to_string());
    let timeline = Arc::new(MemoryTimeline::new());

    info!(flow = %key, limit, "Flowline demo starting...");

    let scope = TopicScope::new(
        Flow::new(key.clone(), Tally { total: 0, limit }),
        timeline.clone(),
        move || -> Result<DemoDeps> { Ok(DemoDeps { run_id }) },
    );
    let handle = spawn_topic(scope, config.runner_capacity);

    for (seq, amount) in (1..).zip([3u64, 4, 5, 6]) {
        let point = TimelinePoint::new(
            TimelinePosition::new(seq),
            key.clone(),
            RoutePolicy::when_only(),
            RawEvent::new("tally:counted", serde_json::json!({ "amount": amount })),
        );
        if handle.push(point).await.is_err() {
            break;
        }
    }

    let report = handle.join().await?;
    info!(
        processed = report.processed,
        last = ?report.last,
        "Flow finished"
    );

    for record in timeline.records() {
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}
