//! Versioned write pipeline and tenant-checked reads.
//!
//! `CommandService` composes the event log, the snapshot cells, the projector,
//! the tenant guard and an optional notification bus. A submit runs:
//!
//! ```text
//! VersionedCommand
//!   ↓
//! 1. TenantGuard (pk tenant, explicit tenant, payload tenant)
//!   ↓
//! 2. Read snapshot cell → head version
//!   ↓
//! 3. Optimistic check: version must be exactly head + 1 (or VERSION_FIRST)
//!   ↓
//! 4. Append event (conditional, never overwrites)
//!   ↓
//! 5. Fold event over the cell, conditional put on the head version
//!   ↓
//! 6. Publish (best effort, never undoes the write)
//! ```
//!
//! Correctness rests on the two conditional puts alone; no lock is held across
//! calls. Of two writers at the same version exactly one append lands; the
//! other catches the cell up and reports a conflict with the fresh head.
//!
//! ## Interrupted submits
//!
//! If a submit stops after step 4 (cancellation, timeout, crash), the log is
//! ahead of the cell. The divergence is detected by comparing the log head
//! with the cell version and repaired by folding the missing events
//! incrementally ([`CommandService::reconcile`]). A retried submit that hits
//! its own recorded version does this automatically and reports
//! `Conflict { submitted, current: Some(submitted) }`, which the caller can
//! recognise with `DomainError::is_possible_replay`.
//!
//! With `reconcile_on_read` (the default) every read repairs the cells it is
//! about to return, so a recorded event is never hidden behind a stale
//! snapshot. Events folded by a catch-up are published like accepted ones.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use keystone_core::{
    DomainError, KeyCodec, TenantContext, check_next_version, next_version, validate_base_sk,
};
use keystone_events::{
    CommandEvent, DataSnapshot, EventBus, EventKind, Projector, TenantGuard, VersionedCommand,
    merge_shallow,
};

use crate::config::CoreConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::EventStore;
use crate::read_model::SnapshotStore;
use crate::store::{ItemStore, TimeoutStore};

/// Result of an accepted (or skipped) submit. Conflicts are errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The event was recorded. `snapshot` is the visible state after it
    /// (`None` after a delete).
    Accepted {
        event: CommandEvent,
        snapshot: Option<DataSnapshot>,
    },
    /// Nothing recorded: the payload would not change the visible data.
    Unchanged(DataSnapshot),
}

impl SubmitOutcome {
    pub fn snapshot(&self) -> Option<&DataSnapshot> {
        match self {
            SubmitOutcome::Accepted { snapshot, .. } => snapshot.as_ref(),
            SubmitOutcome::Unchanged(snapshot) => Some(snapshot),
        }
    }

    pub fn event(&self) -> Option<&CommandEvent> {
        match self {
            SubmitOutcome::Accepted { event, .. } => Some(event),
            SubmitOutcome::Unchanged(_) => None,
        }
    }
}

/// What a reconcile pass found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Cell version before the pass.
    pub before: Option<u64>,
    /// Cell version after the pass.
    pub after: Option<u64>,
    /// Events folded into the cell by this pass.
    pub applied: usize,
}

impl ReconcileReport {
    pub fn was_lagging(&self) -> bool {
        self.applied > 0
    }
}

pub struct CommandService<S> {
    events: EventStore<TimeoutStore<S>>,
    snapshots: SnapshotStore<TimeoutStore<S>>,
    projector: Projector,
    guard: TenantGuard,
    codec: Arc<KeyCodec>,
    bus: Option<Arc<dyn EventBus<CommandEvent>>>,
    skip_unchanged: bool,
    reconcile_on_read: bool,
}

impl<S> std::fmt::Debug for CommandService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("codec", &self.codec)
            .field("has_bus", &self.bus.is_some())
            .field("skip_unchanged", &self.skip_unchanged)
            .field("reconcile_on_read", &self.reconcile_on_read)
            .finish_non_exhaustive()
    }
}

impl<S: ItemStore + Clone> CommandService<S> {
    pub fn new(store: S, config: &CoreConfig) -> Self {
        let codec = Arc::new(config.key_codec());
        let store = TimeoutStore::new(store, config.io_timeout);

        Self {
            events: EventStore::new(store.clone()),
            snapshots: SnapshotStore::new(store),
            projector: Projector::new(codec.clone()),
            guard: TenantGuard::new(codec.clone()),
            codec,
            bus: None,
            skip_unchanged: config.skip_unchanged,
            reconcile_on_read: config.reconcile_on_read,
        }
    }
}

impl<S> CommandService<S> {
    /// Publish every accepted event to `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn EventBus<CommandEvent>>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }
}

impl<S: ItemStore> CommandService<S> {
    /// Submit one versioned write.
    ///
    /// Rejections are `DomainError::Conflict` (stale or skipped version),
    /// `TenantMismatch`, or `NotFound` for deleting a key that is not visible.
    #[instrument(
        skip(self, ctx, command),
        fields(
            pk = %command.pk(),
            sk = %command.sk(),
            version = command.version(),
            tenant = %ctx.tenant_code(),
        )
    )]
    pub async fn submit(
        &self,
        ctx: &TenantContext,
        command: VersionedCommand,
    ) -> ServiceResult<SubmitOutcome> {
        self.guard.authorize_resource(&command, ctx.tenant_code())?;

        let pk = command.pk().to_string();
        let sk = command.sk().to_string();

        let cell = self.snapshots.get(&pk, &sk).await?;
        let head = cell.as_ref().map(|c| c.version);
        if let Err(err) = check_next_version(head, command.version()) {
            match &err {
                DomainError::Conflict { .. } => tracing::debug!(?head, "stale version"),
                _ => tracing::error!(?head, error = %err, "version check failed"),
            }
            return Err(err.into());
        }

        let visible = cell.as_ref().filter(|c| c.is_visible());
        if command.is_deleted() && visible.is_none() {
            return Err(DomainError::not_found().into());
        }
        if self.skip_unchanged && !command.is_deleted() {
            if let Some(current) = visible {
                let mut merged = current.data.clone();
                merge_shallow(&mut merged, command.payload());
                if merged == current.data {
                    tracing::debug!("payload does not change data; skipped");
                    return Ok(SubmitOutcome::Unchanged(current.clone()));
                }
            }
        }

        let kind = EventKind::for_write(command.is_deleted(), visible.is_some());
        let event = command.into_event(kind, ctx, Utc::now());

        if let Err(err) = self.events.append(&event).await {
            if !err.is_integrity_violation() {
                return Err(err);
            }
            // The version is already recorded: a racing writer won, or an
            // earlier attempt stopped before updating the cell.
            let report = self.catch_up(&pk, &sk).await?;
            tracing::debug!(current = ?report.after, "append lost the race");
            return Err(DomainError::conflict(event.version, report.after).into());
        }

        let snapshot = self.projector.fold_incremental(cell.as_ref(), &event)?;
        match self.snapshots.put(&snapshot, head).await {
            Ok(()) => {}
            Err(ServiceError::Store(e)) if e.is_condition_failed() => {
                // A concurrent catch-up folded this event already.
                self.catch_up(&pk, &sk).await?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "event recorded but snapshot update failed");
                return Err(err);
            }
        }

        self.publish(&event);
        tracing::info!(kind = event.kind.as_str(), "command accepted");

        Ok(SubmitOutcome::Accepted {
            event,
            snapshot: snapshot.into_visible(),
        })
    }

    /// Current visible state of a key (`None` if absent or deleted).
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_code()))]
    pub async fn get(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<Option<DataSnapshot>> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;
        validate_base_sk(sk)?;

        if self.reconcile_on_read {
            self.catch_up(pk, sk).await?;
        }

        let Some(cell) = self.snapshots.get(pk, sk).await? else {
            return Ok(None);
        };
        self.guard.authorize_resource(&cell, ctx.tenant_code())?;
        Ok(cell.into_visible())
    }

    /// Head version of a key including deleted ones (`None` without history).
    pub async fn head(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<Option<u64>> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;
        validate_base_sk(sk)?;

        if self.reconcile_on_read {
            return Ok(self.catch_up(pk, sk).await?.after);
        }
        Ok(self.snapshots.get(pk, sk).await?.map(|c| c.version))
    }

    /// Version the next write of a key must carry.
    pub async fn next_version(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<u64> {
        Ok(next_version(self.head(ctx, pk, sk).await?))
    }

    /// Visible snapshots under `pk` whose sort key begins with `sk_prefix`.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_code()))]
    pub async fn list(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk_prefix: &str,
    ) -> ServiceResult<Vec<DataSnapshot>> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;

        if self.reconcile_on_read {
            for sk in self.events.keys_with_prefix(pk, sk_prefix).await? {
                self.catch_up(pk, &sk).await?;
            }
        }

        let snapshots = self.snapshots.list_by_prefix(pk, sk_prefix).await?;
        for snapshot in &snapshots {
            self.guard.authorize_resource(snapshot, ctx.tenant_code())?;
        }
        Ok(snapshots)
    }

    /// Full history of a key, ascending by version. Deleted keys keep theirs.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_code()))]
    pub async fn list_events(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<Vec<CommandEvent>> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;

        let events = self.events.list_events(pk, sk).await?;
        for event in &events {
            self.guard.authorize_resource(event, ctx.tenant_code())?;
        }
        Ok(events)
    }

    pub async fn get_event(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
        version: u64,
    ) -> ServiceResult<Option<CommandEvent>> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;

        let event = self.events.get_event(pk, sk, version).await?;
        if let Some(event) = &event {
            self.guard.authorize_resource(event, ctx.tenant_code())?;
        }
        Ok(event)
    }

    /// Visible state as of `version`, replayed from the log.
    pub async fn state_at(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
        version: u64,
    ) -> ServiceResult<Option<DataSnapshot>> {
        let mut events = self.list_events(ctx, pk, sk).await?;
        events.retain(|e| e.version <= version);
        Ok(self.projector.project(&events)?)
    }

    /// Bring the snapshot cell up to the event log head.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_code()))]
    pub async fn reconcile(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<ReconcileReport> {
        self.guard.authorize(pk, None, ctx.tenant_code())?;
        validate_base_sk(sk)?;
        self.catch_up(pk, sk).await
    }

    /// Re-fold the whole history and overwrite the snapshot cell.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_code()))]
    pub async fn rebuild(
        &self,
        ctx: &TenantContext,
        pk: &str,
        sk: &str,
    ) -> ServiceResult<Option<DataSnapshot>> {
        let events = self.list_events(ctx, pk, sk).await?;
        let folded = self.projector.fold(&events)?;
        let cell = self.snapshots.get(pk, sk).await?;

        let Some(snapshot) = folded else {
            if cell.is_some() {
                tracing::error!("snapshot cell exists without any events");
                let reason = format!("{pk}|{sk} has a cell but no history");
                return Err(DomainError::integrity(reason).into());
            }
            return Ok(None);
        };

        let expected = cell.as_ref().map(|c| c.version);
        if expected.is_some_and(|v| v > snapshot.version) {
            return Err(cell_ahead(pk, sk, expected, Some(snapshot.version)).into());
        }
        if cell.as_ref() != Some(&snapshot) {
            self.snapshots.put(&snapshot, expected).await?;
            tracing::info!(before = ?expected, after = snapshot.version, "snapshot rebuilt");
        }
        Ok(snapshot.into_visible())
    }

    async fn catch_up(&self, pk: &str, sk: &str) -> ServiceResult<ReconcileReport> {
        let events = self.events.list_events(pk, sk).await?;
        let log_head = events.last().map(|e| e.version);
        let cell = self.snapshots.get(pk, sk).await?;
        let before = cell.as_ref().map(|c| c.version);

        if before == log_head {
            return Ok(ReconcileReport {
                before,
                after: before,
                applied: 0,
            });
        }
        if before > log_head {
            tracing::error!(pk, sk, ?before, ?log_head, "snapshot ahead of event log");
            return Err(cell_ahead(pk, sk, before, log_head).into());
        }

        let missing: Vec<&CommandEvent> = events
            .iter()
            .filter(|e| before.is_none_or(|b| e.version > b))
            .collect();
        let mut current = cell;
        for event in &missing {
            current = Some(self.projector.fold_incremental(current.as_ref(), event)?);
        }
        let applied = missing.len();
        let Some(snapshot) = current else {
            return Ok(ReconcileReport {
                before,
                after: before,
                applied: 0,
            });
        };

        match self.snapshots.put(&snapshot, before).await {
            Ok(()) => {
                tracing::warn!(
                    pk,
                    sk,
                    ?before,
                    after = snapshot.version,
                    applied,
                    "snapshot caught up with event log"
                );
                // These events never reached subscribers through their submit.
                for event in missing {
                    self.publish(event);
                }
                Ok(ReconcileReport {
                    before,
                    after: Some(snapshot.version),
                    applied,
                })
            }
            Err(ServiceError::Store(e)) if e.is_condition_failed() => {
                // Someone else moved the cell forward meanwhile.
                let after = self.snapshots.get(pk, sk).await?.map(|c| c.version);
                Ok(ReconcileReport {
                    before,
                    after,
                    applied: 0,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn publish(&self, event: &CommandEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        if let Err(err) = bus.publish(event.clone()) {
            tracing::warn!(error = %err, "event publication failed");
        }
    }
}

fn cell_ahead(pk: &str, sk: &str, cell: Option<u64>, log: Option<u64>) -> DomainError {
    DomainError::integrity(format!(
        "snapshot of {pk}|{sk} at {cell:?} is ahead of event log at {log:?}"
    ))
}
