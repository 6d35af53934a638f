//! Command events, write intents, snapshots and their projection.
//!
//! Everything in this crate is storage-agnostic: the infra crate owns I/O.

pub mod bus;
pub mod command;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod snapshot;
pub mod tenant;

pub use bus::{BusError, EventBus, Subscription};
pub use command::{VersionedCommand, VersionedCommandBuilder};
pub use event::{CommandEvent, EventKind, PAYLOAD_TENANT_FIELD, Payload, payload_from_value};
pub use in_memory_bus::{DEFAULT_BUS_CAPACITY, InMemoryEventBus};
pub use projection::{Projector, merge_shallow};
pub use snapshot::DataSnapshot;
pub use tenant::{TenantGuard, TenantScoped};
