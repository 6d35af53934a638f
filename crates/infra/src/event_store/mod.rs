//! Append-only command event log.
//!
//! Events live in the `Command` table under `(pk, {sk}@{version})`. An append
//! is a single conditional put that never overwrites: landing on an existing
//! version is an integrity violation, distinct from the ordinary version
//! conflict that the command service checks before appending.

use std::collections::BTreeSet;

use keystone_core::{
    DomainError, history_prefix, make_history_sk, parse_history_sk, validate_base_sk,
};
use keystone_events::CommandEvent;

use crate::error::ServiceResult;
use crate::store::{ItemStore, PutCondition, StoreError, StoredItem, Table};

#[derive(Debug, Clone)]
pub struct EventStore<S> {
    store: S,
}

impl<S> EventStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ItemStore> EventStore<S> {
    /// Durably record one event. Never overwrites.
    pub async fn append(&self, event: &CommandEvent) -> ServiceResult<()> {
        validate_base_sk(&event.sk)?;

        let item = StoredItem {
            pk: event.pk.clone(),
            sk: event.history_sk(),
            version: event.version,
            body: serde_json::to_value(event).map_err(StoreError::from)?,
        };

        match self.store.put(Table::Command, item, PutCondition::NotExists).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_condition_failed() => {
                tracing::error!(
                    pk = %event.pk,
                    sk = %event.sk,
                    version = event.version,
                    "append hit an existing event version"
                );
                Err(DomainError::integrity(format!(
                    "event {}|{} already exists",
                    event.pk,
                    event.history_sk()
                ))
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full history of one key, ascending by version.
    pub async fn list_events(&self, pk: &str, sk: &str) -> ServiceResult<Vec<CommandEvent>> {
        validate_base_sk(sk)?;

        let items = self
            .store
            .query(Table::Command, pk, &history_prefix(sk))
            .await?;

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let parsed = parse_history_sk(&item.sk);
            let Some(version) = parsed.version else {
                tracing::warn!(pk, sk = %item.sk, "skipping history item without version");
                continue;
            };
            if parsed.base_sk != sk {
                continue;
            }
            events.push(decode(item, pk, sk, version)?);
        }

        // Lexical sort-key order puts @10 before @2.
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    pub async fn get_event(
        &self,
        pk: &str,
        sk: &str,
        version: u64,
    ) -> ServiceResult<Option<CommandEvent>> {
        validate_base_sk(sk)?;

        self.store
            .get(Table::Command, pk, &make_history_sk(sk, version))
            .await?
            .map(|item| decode(item, pk, sk, version))
            .transpose()
    }

    /// Base sort keys under `pk` starting with `sk_prefix` that have history.
    pub async fn keys_with_prefix(&self, pk: &str, sk_prefix: &str) -> ServiceResult<Vec<String>> {
        let items = self.store.query(Table::Command, pk, sk_prefix).await?;

        let keys: BTreeSet<String> = items
            .into_iter()
            .map(|item| parse_history_sk(&item.sk))
            .filter(|parsed| parsed.version.is_some())
            .map(|parsed| parsed.base_sk)
            .collect();
        Ok(keys.into_iter().collect())
    }
}

fn decode(item: StoredItem, pk: &str, sk: &str, version: u64) -> ServiceResult<CommandEvent> {
    let event: CommandEvent = serde_json::from_value(item.body).map_err(StoreError::from)?;
    if event.pk != pk || event.sk != sk || event.version != version {
        return Err(DomainError::integrity(format!(
            "item {pk}|{} holds event {}|{}@{}",
            item.sk, event.pk, event.sk, event.version
        ))
        .into());
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use keystone_core::TenantCode;
    use keystone_events::{EventKind, payload_from_value};
    use serde_json::json;
    use uuid::Uuid;

    use crate::error::ServiceError;
    use crate::store::InMemoryItemStore;

    fn event(sk: &str, version: u64) -> CommandEvent {
        CommandEvent {
            event_id: Uuid::now_v7(),
            pk: "MASTER#T".to_string(),
            sk: sk.to_string(),
            version,
            kind: if version == 0 { EventKind::Create } else { EventKind::Update },
            timestamp: Utc::now(),
            tenant_code: TenantCode::new("T").unwrap(),
            payload: payload_from_value(json!({"v": version})).unwrap(),
            actor: None,
            request_id: None,
        }
    }

    fn setup() -> (Arc<InMemoryItemStore>, EventStore<Arc<InMemoryItemStore>>) {
        let items = Arc::new(InMemoryItemStore::new());
        (items.clone(), EventStore::new(items))
    }

    #[tokio::test]
    async fn history_is_ordered_numerically() {
        let (_, store) = setup();
        for v in [0, 1, 2, 10, 3, 4, 5, 6, 7, 8, 9, 11] {
            store.append(&event("PROD#001", v)).await.unwrap();
        }
        store.append(&event("PROD#0010", 0)).await.unwrap();

        let versions: Vec<u64> = store
            .list_events("MASTER#T", "PROD#001")
            .await
            .unwrap()
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, (0..=11).collect::<Vec<_>>());
        assert!(store.list_events("MASTER#T", "PROD#002").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_with_prefix_lists_each_base_key_once() {
        let (_, store) = setup();
        for (sk, v) in [("PROD#001", 0), ("PROD#001", 1), ("PROD#002", 0), ("CUST#001", 0)] {
            store.append(&event(sk, v)).await.unwrap();
        }

        let keys = store.keys_with_prefix("MASTER#T", "PROD#").await.unwrap();
        assert_eq!(keys, vec!["PROD#001", "PROD#002"]);
        assert_eq!(store.keys_with_prefix("MASTER#T", "").await.unwrap().len(), 3);
        assert!(store.keys_with_prefix("MASTER#U", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_never_overwrites() {
        let (items, store) = setup();
        store.append(&event("PROD#001", 0)).await.unwrap();

        let err = store.append(&event("PROD#001", 0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::IntegrityViolation(_))));
        assert_eq!(items.count(Table::Command).unwrap(), 1);
    }

    #[tokio::test]
    async fn get_event_by_version() {
        let (_, store) = setup();
        store.append(&event("PROD#001", 0)).await.unwrap();
        store.append(&event("PROD#001", 1)).await.unwrap();

        let ev = store.get_event("MASTER#T", "PROD#001", 1).await.unwrap().unwrap();
        assert_eq!(ev.version, 1);
        assert_eq!(ev.payload["v"], 1);
        assert!(store.get_event("MASTER#T", "PROD#001", 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn versioned_sort_keys_are_rejected() {
        let (_, store) = setup();
        let err = store.list_events("MASTER#T", "PROD#001@1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidKey(_))));
    }
}
