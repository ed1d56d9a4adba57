//! Timeline vocabulary shared by flows and the collaborators that feed them.
//!
//! Positions, routing flags, points and the untyped events they carry.
//! Zero knowledge of any concrete flow, handler or storage backend.
//!
//! Flows resolve a point's raw event into their own closed event enum
//! through an `EventRegistry`.

pub mod registry;
pub mod types;

pub use registry::{EventDescriptor, EventRegistry, RegistryError};
pub use types::{FlowKey, NewEvent, RawEvent, RoutePolicy, TimelinePoint, TimelinePosition};
