//! Infrastructure layer: item store, event log, snapshot cells, command
//! pipeline and configuration.

pub mod command_service;
pub mod config;
pub mod error;
pub mod event_store;
pub mod read_model;
pub mod store;


pub use command_service::{CommandService, ReconcileReport, SubmitOutcome};
pub use config::{ConfigError, CoreConfig};
pub use error::{ServiceError, ServiceResult};
pub use event_store::EventStore;
pub use read_model::SnapshotStore;
pub use store::{
    InMemoryItemStore, ItemStore, PutCondition, StoreError, StoredItem, Table, TimeoutStore,
};
