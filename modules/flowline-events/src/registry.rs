//! Event type registry: identifier → typed decoder.
//!
//! A flow declares the closed set of events it understands. Each point's raw
//! event is resolved once, by identifier, into one variant of that set.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::types::RawEvent;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown event type: {event_type}")]
    UnknownEvent { event_type: String },

    #[error("failed to decode {event_type}: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

type Decoder<E> = Box<dyn Fn(&serde_json::Value) -> Result<E, serde_json::Error> + Send + Sync>;

/// The registered shape of one event identifier.
pub struct EventDescriptor<E> {
    event_type: String,
    decoder: Decoder<E>,
}

impl<E> EventDescriptor<E> {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn decode(&self, payload: &serde_json::Value) -> Result<E, RegistryError> {
        (self.decoder)(payload).map_err(|source| RegistryError::Decode {
            event_type: self.event_type.clone(),
            source,
        })
    }
}

impl<E> fmt::Debug for EventDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Maps event identifiers to variants of a flow's event enum `E`.
pub struct EventRegistry<E> {
    descriptors: HashMap<String, EventDescriptor<E>>,
}

impl<E: 'static> EventRegistry<E> {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Register `identifier` as payload `P`, wrapped into `E` by `ctor`.
    /// Registering the same identifier again replaces the earlier entry.
    pub fn register<P>(mut self, identifier: impl Into<String>, ctor: fn(P) -> E) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        let event_type = identifier.into();
        let decoder: Decoder<E> = Box::new(move |payload| P::deserialize(payload).map(ctor));
        self.descriptors.insert(
            event_type.clone(),
            EventDescriptor {
                event_type,
                decoder,
            },
        );
        self
    }

    pub fn get(&self, identifier: &str) -> Result<&EventDescriptor<E>, RegistryError> {
        self.descriptors
            .get(identifier)
            .ok_or_else(|| RegistryError::UnknownEvent {
                event_type: identifier.to_string(),
            })
    }

    pub fn decode(&self, event: &RawEvent) -> Result<E, RegistryError> {
        self.get(&event.event_type)?.decode(&event.payload)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.descriptors.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl<E: 'static> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.descriptors.keys().collect::<Vec<_>>())
            .finish()
    }
}
