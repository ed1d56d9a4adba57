//! Core types for the timeline. Domain-agnostic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point's place on the timeline. Totally ordered, assigned once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelinePosition(pub i64);

impl TimelinePosition {
    pub fn new(seq: i64) -> Self {
        Self(seq)
    }

    pub fn seq(self) -> i64 {
        self.0
    }

    /// The following position, or `None` at the end of the range.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for TimelinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identifies one flow instance: its type plus an instance id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub flow_type: String,
    pub id: String,
}

impl FlowKey {
    pub fn new(flow_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            flow_type: flow_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.flow_type, self.id)
    }
}

/// Which handlers apply to an event for a flow type.
///
/// Supplied by the routing table; never changed by the flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub given: bool,
    pub when: bool,
    pub then: bool,
}

impl RoutePolicy {
    pub fn given_only() -> Self {
        Self {
            given: true,
            ..Self::default()
        }
    }

    pub fn when_only() -> Self {
        Self {
            when: true,
            ..Self::default()
        }
    }

    pub fn given_when() -> Self {
        Self {
            given: true,
            when: true,
            then: false,
        }
    }

    pub fn all() -> Self {
        Self {
            given: true,
            when: true,
            then: true,
        }
    }
}

/// An event as it sits on the timeline: identifier plus JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// One unit of work for a flow: where, what, and which handlers apply.
///
/// Built by the scheduler; read-only to the flow being advanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub position: TimelinePosition,
    pub cause: Option<TimelinePosition>,
    pub ts: DateTime<Utc>,
    pub flow: FlowKey,
    pub route: RoutePolicy,
    pub event: RawEvent,
}

impl TimelinePoint {
    pub fn new(
        position: TimelinePosition,
        flow: FlowKey,
        route: RoutePolicy,
        event: RawEvent,
    ) -> Self {
        Self {
            position,
            cause: None,
            ts: Utc::now(),
            flow,
            route,
            event,
        }
    }

    pub fn with_cause(mut self, cause: TimelinePosition) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }
}

/// An event produced by a flow, serialized for the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_order_by_sequence() {
        let a = TimelinePosition::new(3);
        let b = a.next().unwrap();
        assert!(a < b);
        assert_eq!(b.seq(), 4);
        assert_eq!(b.to_string(), "@4");
    }

    #[test]
    fn last_position_has_no_successor() {
        assert_eq!(TimelinePosition::new(i64::MAX).next(), None);
        assert_eq!(
            TimelinePosition::new(i64::MAX - 1).next(),
            Some(TimelinePosition::new(i64::MAX))
        );
    }

    #[test]
    fn flow_key_displays_type_and_id() {
        let key = FlowKey::new("ledger", "acct-7");
        assert_eq!(key.to_string(), "ledger/acct-7");
    }

    #[test]
    fn route_constructors_set_expected_flags() {
        assert_eq!(
            RoutePolicy::given_only(),
            RoutePolicy {
                given: true,
                when: false,
                then: false
            }
        );
        assert!(RoutePolicy::when_only().when);
        assert!(!RoutePolicy::when_only().given);
        assert!(RoutePolicy::all().then);
    }
}
