use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Logical tables of the underlying store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    /// Append-only event log, one item per `(pk, {sk}@{version})`.
    Command,
    /// Snapshot cells, one item per `(pk, sk)`.
    Data,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Command => "command",
            Table::Data => "data",
        }
    }
}

/// One item as the store sees it.
///
/// `version` is lifted out of the body so conditional writes can compare it
/// without decoding the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub pk: String,
    pub sk: String,
    pub version: u64,
    pub body: JsonValue,
}

/// Precondition of a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// No item may exist at `(pk, sk)`.
    NotExists,
    /// An item must exist at `(pk, sk)` with exactly this version.
    VersionEquals(u64),
}

/// Item store failure.
///
/// `ConditionFailed` is the normal outcome of losing a race. `Timeout` and
/// `Unavailable` are transient and left to the caller's retry policy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conditional write failed on {table}:{pk}|{sk}")]
    ConditionFailed {
        table: &'static str,
        pk: String,
        sk: String,
    },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("item serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn condition_failed(table: Table, pk: &str, sk: &str) -> Self {
        Self::ConditionFailed {
            table: table.as_str(),
            pk: pk.to_string(),
            sk: sk.to_string(),
        }
    }

    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Minimal key/value contract the persistence core runs on.
///
/// Any backend offering these three primitives (a conditional put, a
/// partition range read with a sort-key prefix, and a point read) can host
/// the core. Correctness rests on `put` conditions alone; implementations
/// need no cross-call locking.
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Write `item` iff `condition` holds, atomically.
    async fn put(
        &self,
        table: Table,
        item: StoredItem,
        condition: PutCondition,
    ) -> Result<(), StoreError>;

    /// Point read by exact key.
    async fn get(&self, table: Table, pk: &str, sk: &str) -> Result<Option<StoredItem>, StoreError>;

    /// All items under `pk` whose sort key begins with `sk_prefix`, ordered by
    /// sort key.
    async fn query(
        &self,
        table: Table,
        pk: &str,
        sk_prefix: &str,
    ) -> Result<Vec<StoredItem>, StoreError>;
}

#[async_trait::async_trait]
impl<S> ItemStore for Arc<S>
where
    S: ItemStore + ?Sized,
{
    async fn put(
        &self,
        table: Table,
        item: StoredItem,
        condition: PutCondition,
    ) -> Result<(), StoreError> {
        (**self).put(table, item, condition).await
    }

    async fn get(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
    ) -> Result<Option<StoredItem>, StoreError> {
        (**self).get(table, pk, sk).await
    }

    async fn query(
        &self,
        table: Table,
        pk: &str,
        sk_prefix: &str,
    ) -> Result<Vec<StoredItem>, StoreError> {
        (**self).query(table, pk, sk_prefix).await
    }
}
