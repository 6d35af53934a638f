use std::collections::BTreeMap;
use std::sync::RwLock;

use super::r#trait::{ItemStore, PutCondition, StoreError, StoredItem, Table};

type ItemKey = (Table, String, String);

/// In-memory item store over an ordered map.
///
/// Intended for tests/dev and single-process use. Conditional writes are
/// checked and applied under one write lock, so they are atomic.
#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    items: RwLock<BTreeMap<ItemKey, StoredItem>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in `table`.
    pub fn count(&self, table: Table) -> Result<usize, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.keys().filter(|(t, _, _)| *t == table).count())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl ItemStore for InMemoryItemStore {
    async fn put(
        &self,
        table: Table,
        item: StoredItem,
        condition: PutCondition,
    ) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let key = (table, item.pk.clone(), item.sk.clone());

        let holds = match (condition, items.get(&key)) {
            (PutCondition::NotExists, existing) => existing.is_none(),
            (PutCondition::VersionEquals(expected), Some(existing)) => existing.version == expected,
            (PutCondition::VersionEquals(_), None) => false,
        };
        if !holds {
            return Err(StoreError::condition_failed(table, &item.pk, &item.sk));
        }

        items.insert(key, item);
        Ok(())
    }

    async fn get(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
    ) -> Result<Option<StoredItem>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items
            .get(&(table, pk.to_string(), sk.to_string()))
            .cloned())
    }

    async fn query(
        &self,
        table: Table,
        pk: &str,
        sk_prefix: &str,
    ) -> Result<Vec<StoredItem>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let start = (table, pk.to_string(), sk_prefix.to_string());

        Ok(items
            .range(start..)
            .take_while(|((t, p, s), _)| *t == table && p == pk && s.starts_with(sk_prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(pk: &str, sk: &str, version: u64) -> StoredItem {
        StoredItem {
            pk: pk.to_string(),
            sk: sk.to_string(),
            version,
            body: json!({"v": version}),
        }
    }

    #[tokio::test]
    async fn not_exists_rejects_second_write() {
        let store = InMemoryItemStore::new();
        store
            .put(Table::Command, item("MASTER#T", "A@0", 0), PutCondition::NotExists)
            .await
            .unwrap();

        let err = store
            .put(Table::Command, item("MASTER#T", "A@0", 0), PutCondition::NotExists)
            .await
            .unwrap_err();
        assert!(err.is_condition_failed());

        // Same key in the other table is independent.
        store
            .put(Table::Data, item("MASTER#T", "A@0", 0), PutCondition::NotExists)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn version_equals_requires_exact_match() {
        let store = InMemoryItemStore::new();
        let err = store
            .put(Table::Data, item("MASTER#T", "A", 0), PutCondition::VersionEquals(0))
            .await
            .unwrap_err();
        assert!(err.is_condition_failed());

        store
            .put(Table::Data, item("MASTER#T", "A", 0), PutCondition::NotExists)
            .await
            .unwrap();
        store
            .put(Table::Data, item("MASTER#T", "A", 1), PutCondition::VersionEquals(0))
            .await
            .unwrap();
        assert!(
            store
                .put(Table::Data, item("MASTER#T", "A", 2), PutCondition::VersionEquals(0))
                .await
                .is_err()
        );

        let current = store.get(Table::Data, "MASTER#T", "A").await.unwrap().unwrap();
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn query_is_prefix_and_partition_bounded() {
        let store = InMemoryItemStore::new();
        for (pk, sk) in [
            ("MASTER#T", "PROD#001@0"),
            ("MASTER#T", "PROD#001@1"),
            ("MASTER#T", "PROD#0010@0"),
            ("MASTER#T", "PROD#002@0"),
            ("MASTER#U", "PROD#001@0"),
        ] {
            store
                .put(Table::Command, item(pk, sk, 0), PutCondition::NotExists)
                .await
                .unwrap();
        }

        let hits = store.query(Table::Command, "MASTER#T", "PROD#001@").await.unwrap();
        let sks: Vec<_> = hits.iter().map(|i| i.sk.as_str()).collect();
        assert_eq!(sks, vec!["PROD#001@0", "PROD#001@1"]);

        let all = store.query(Table::Command, "MASTER#T", "PROD#").await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(store.count(Table::Command).unwrap(), 5);
        assert!(store.query(Table::Data, "MASTER#T", "").await.unwrap().is_empty());
    }
}
