use std::future::Future;
use std::time::Duration;

use super::r#trait::{ItemStore, PutCondition, StoreError, StoredItem, Table};

/// Bound a single store call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Adapter that applies a per-call timeout to every store operation.
///
/// Timeouts are per I/O call, never per composed operation: a submit that
/// issues four calls gets four independent budgets. A timed-out `put` may or
/// may not have landed; callers recover by reconciling, not by guessing.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    limit: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait::async_trait]
impl<S> ItemStore for TimeoutStore<S>
where
    S: ItemStore,
{
    async fn put(
        &self,
        table: Table,
        item: StoredItem,
        condition: PutCondition,
    ) -> Result<(), StoreError> {
        with_timeout(self.limit, self.inner.put(table, item, condition)).await
    }

    async fn get(
        &self,
        table: Table,
        pk: &str,
        sk: &str,
    ) -> Result<Option<StoredItem>, StoreError> {
        with_timeout(self.limit, self.inner.get(table, pk, sk)).await
    }

    async fn query(
        &self,
        table: Table,
        pk: &str,
        sk_prefix: &str,
    ) -> Result<Vec<StoredItem>, StoreError> {
        with_timeout(self.limit, self.inner.query(table, pk, sk_prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryItemStore;

    struct SlowStore;

    #[async_trait::async_trait]
    impl ItemStore for SlowStore {
        async fn put(&self, _: Table, _: StoredItem, _: PutCondition) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn get(&self, _: Table, _: &str, _: &str) -> Result<Option<StoredItem>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn query(&self, _: Table, _: &str, _: &str) -> Result<Vec<StoredItem>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let store = TimeoutStore::new(SlowStore, Duration::from_millis(50));
        let err = store.get(Table::Data, "MASTER#T", "A").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(err.is_transient());

        // Fast calls are untouched.
        assert!(store.query(Table::Data, "MASTER#T", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wraps_in_memory_store_transparently() {
        let store = TimeoutStore::new(InMemoryItemStore::new(), Duration::from_secs(1));
        assert!(store.get(Table::Data, "MASTER#T", "A").await.unwrap().is_none());
    }
}
