use keystone_core::DomainError;
use keystone_events::DataSnapshot;

use crate::error::ServiceResult;
use crate::store::{ItemStore, PutCondition, StoreError, StoredItem, Table};

/// The single mutable snapshot cell per `(pk, sk)`, kept in the `Data` table.
///
/// Cells hold tombstones too, so the head version of a logically deleted key
/// is never lost. Every overwrite is conditional on the version the writer
/// read; a lost race surfaces as `StoreError::ConditionFailed`.
#[derive(Debug, Clone)]
pub struct SnapshotStore<S> {
    store: S,
}

impl<S> SnapshotStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ItemStore> SnapshotStore<S> {
    /// Raw cell, tombstones included.
    pub async fn get(&self, pk: &str, sk: &str) -> ServiceResult<Option<DataSnapshot>> {
        self.store
            .get(Table::Data, pk, sk)
            .await?
            .map(|item| decode(item, pk))
            .transpose()
    }

    /// Write `snapshot` iff the cell is still at `expected` (`None`: absent).
    pub async fn put(&self, snapshot: &DataSnapshot, expected: Option<u64>) -> ServiceResult<()> {
        let condition = match expected {
            None => PutCondition::NotExists,
            Some(v) => PutCondition::VersionEquals(v),
        };
        let item = StoredItem {
            pk: snapshot.pk.clone(),
            sk: snapshot.sk.clone(),
            version: snapshot.version,
            body: serde_json::to_value(snapshot).map_err(StoreError::from)?,
        };

        self.store.put(Table::Data, item, condition).await?;
        Ok(())
    }

    /// Visible snapshots under `pk` whose sort key begins with `sk_prefix`.
    pub async fn list_by_prefix(
        &self,
        pk: &str,
        sk_prefix: &str,
    ) -> ServiceResult<Vec<DataSnapshot>> {
        let items = self.store.query(Table::Data, pk, sk_prefix).await?;

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Some(snapshot) = decode(item, pk)?.into_visible() {
                out.push(snapshot);
            }
        }
        Ok(out)
    }
}

fn decode(item: StoredItem, pk: &str) -> ServiceResult<DataSnapshot> {
    let snapshot: DataSnapshot = serde_json::from_value(item.body).map_err(StoreError::from)?;
    if snapshot.pk != pk || snapshot.sk != item.sk || snapshot.version != item.version {
        return Err(DomainError::integrity(format!(
            "cell {pk}|{} (v{}) holds snapshot {} (v{})",
            item.sk, item.version, snapshot.id, snapshot.version
        ))
        .into());
    }
    Ok(snapshot)
}
