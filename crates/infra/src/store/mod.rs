//! Underlying item store boundary.
//!
//! The persistence core needs only conditional puts, prefix range reads and
//! point reads over two logical tables. This module defines that contract
//! without making backend assumptions, plus an in-memory implementation and a
//! per-call timeout adapter.

pub mod in_memory;
pub mod timeout;
pub mod r#trait;

pub use in_memory::InMemoryItemStore;
pub use timeout::{TimeoutStore, with_timeout};
pub use r#trait::{ItemStore, PutCondition, StoreError, StoredItem, Table};
