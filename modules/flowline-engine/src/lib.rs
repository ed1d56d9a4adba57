//! Topic processing engine.
//!
//! Advances a flow one timeline point at a time: given → when → push, with
//! every fault turned into a recorded stop. If recording the stop fails as
//! well, both errors come back together.
//!
//! Consumers define their domain by implementing `Topic` (handlers and the
//! events they understand) and plug in a `Timeline` and a `DependencySource`.

pub mod call;
pub mod cancel;
pub mod config;
pub mod deps;
pub mod error;
pub mod flow;
pub mod logging;
pub mod persist;
pub mod runner;
pub mod scope;
pub mod traits;

pub use call::{GivenCall, WhenCall};
pub use cancel::{CancelHandle, CancelSignal};
pub use config::{ConfigError, EngineConfig};
pub use deps::ScopedDependencies;
pub use error::{Cancelled, StopFailed};
pub use flow::{Flow, FlowContext, FlowError, Rejection, Verdict};
pub use persist::{MemoryTimeline, TimelineConflict, TimelineRecord};
pub use runner::{spawn_topic, RunReport, TopicHandle};
pub use scope::{FinishReason, FlowStatus, TopicScope, TurnOutcome};
pub use traits::{DependencySource, EventLike, PushTopicResult, Timeline, Topic};
