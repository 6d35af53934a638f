//! Accepted-event notification (mechanics only).
//!
//! After a write has been durably recorded, the event is published to an
//! [`EventBus`] so downstream consumers (data sync, caches, read replicas) can
//! react. The bus is distribution, not storage:
//!
//! - The event log is the source of truth. A failed publish never undoes the
//!   write; consumers that fell behind re-read the log.
//! - Broadcast semantics: each subscription sees every message published after
//!   it subscribed.
//! - Ordering per key follows publish order; nothing is promised across keys.
//! - Delivery is at-least-once from the consumer's point of view, so consumers
//!   must be idempotent (the event version makes that easy).

use std::sync::Arc;

use keystone_core::TenantCode;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::tenant::TenantScoped;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// All senders are gone; no further messages will arrive.
    #[error("event bus closed")]
    Closed,

    /// The subscription fell behind and `n` messages were dropped for it.
    #[error("subscription lagged, {0} messages skipped")]
    Lagged(u64),
}

/// A subscription to an event stream.
///
/// ```ignore
/// let mut sub = bus.subscribe();
/// loop {
///     match sub.recv().await {
///         Ok(event) => sync(event).await?,
///         Err(BusError::Lagged(n)) => resync_from_log(n).await?,
///         Err(BusError::Closed) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: broadcast::Receiver<M>,
}

impl<M: Clone> Subscription<M> {
    pub fn new(receiver: broadcast::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Result<M, BusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        })
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Result<Option<M>, BusError> {
        match self.receiver.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        }
    }
}

impl<M: Clone + TenantScoped> Subscription<M> {
    /// Wait for the next message owned by `tenant`; others are skipped.
    pub async fn recv_for_tenant(&mut self, tenant: &TenantCode) -> Result<M, BusError> {
        loop {
            let message = self.recv().await?;
            if message.tenant_code() == tenant {
                return Ok(message);
            }
        }
    }
}

/// Publish/subscribe transport for accepted events.
///
/// `publish` returns the number of subscriptions the message reached; having
/// no subscribers is not an error.
pub trait EventBus<M>: Send + Sync {
    fn publish(&self, message: M) -> Result<usize, BusError>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    fn publish(&self, message: M) -> Result<usize, BusError> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
