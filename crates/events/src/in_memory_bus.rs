//! In-process event bus for tests, benches and single-node deployments.

use tokio::sync::broadcast;

use crate::bus::{BusError, EventBus, Subscription};

/// Default number of messages buffered per subscription before it lags.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// In-memory pub/sub bus over a tokio broadcast channel.
///
/// - Fan-out to every live subscription
/// - Bounded: a slow subscription loses the oldest messages and sees
///   [`BusError::Lagged`]
/// - Publishing never blocks
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    sender: broadcast::Sender<M>,
}

impl<M: Clone> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// `capacity` is clamped to at least one message.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl<M: Clone> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    fn publish(&self, message: M) -> Result<usize, BusError> {
        // `send` only fails when nobody is subscribed.
        Ok(self.sender.send(message).unwrap_or(0))
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use keystone_core::TenantCode;
    use uuid::Uuid;

    use crate::event::{CommandEvent, EventKind, Payload};

    fn event(tenant: &str, version: u64) -> CommandEvent {
        CommandEvent {
            event_id: Uuid::now_v7(),
            pk: format!("MASTER#{tenant}"),
            sk: "PROD#001".to_string(),
            version,
            kind: EventKind::Update,
            timestamp: Utc::now(),
            tenant_code: TenantCode::new(tenant).unwrap(),
            payload: Payload::new(),
            actor: None,
            request_id: None,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = InMemoryEventBus::<u32>::new();
        assert_eq!(bus.publish(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_message() {
        let bus = Arc::new(InMemoryEventBus::<u32>::new());
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(7).unwrap(), 2);
        assert_eq!(a.recv().await.unwrap(), 7);
        assert_eq!(b.recv().await.unwrap(), 7);
        assert_eq!(a.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn slow_subscriber_reports_lag() {
        let bus = InMemoryEventBus::<u32>::with_capacity(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(i).unwrap();
        }

        assert_eq!(sub.recv().await, Err(BusError::Lagged(3)));
        assert_eq!(sub.recv().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tenant_filter_skips_other_tenants() {
        let bus = InMemoryEventBus::<CommandEvent>::new();
        let mut sub = bus.subscribe();
        bus.publish(event("A", 0)).unwrap();
        bus.publish(event("B", 0)).unwrap();
        bus.publish(event("A", 1)).unwrap();

        let b = TenantCode::new("B").unwrap();
        let got = sub.recv_for_tenant(&b).await.unwrap();
        assert_eq!(got.tenant_code, b);
        assert_eq!(sub.try_recv().unwrap().map(|e| e.version), Some(1));
    }

    #[tokio::test]
    async fn dropped_bus_closes_subscriptions() {
        let bus = InMemoryEventBus::<u32>::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, Err(BusError::Closed));
    }
}
