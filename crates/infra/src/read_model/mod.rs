//! Materialized current-state storage.
//!
//! Snapshots are disposable: the event log can always regenerate them.

pub mod snapshot_store;

pub use snapshot_store::SnapshotStore;
