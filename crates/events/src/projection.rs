//! Event history → current-state projection.
//!
//! The projector folds the ordered events of one `(pk, sk)` into a
//! [`DataSnapshot`]. It is pure: no I/O, no clock, and the same input always
//! yields the same output, which is what makes snapshots disposable.
//!
//! ## Folding rules
//!
//! - Events are sorted by `version` before folding; input order is not trusted.
//! - `data` starts empty and each event's payload is merged over it with a
//!   shallow key overwrite. Keys absent from a later payload are retained.
//! - `version`, `updated_at` and `updated_by` come from the last event;
//!   `created_at` and `created_by` from the first.
//! - If the last event is a `DELETE`, the result is a tombstone and the visible
//!   projection is `None`, however many writes came before it.
//!
//! ## Two entry points
//!
//! - [`Projector::fold`] / [`Projector::project`]: full replay of a history.
//! - [`Projector::fold_incremental`] / [`Projector::apply_incremental`]: one new
//!   event over the stored snapshot cell. For any history,
//!   `fold_incremental(fold(events[..n]), events[n]) == fold(events[..=n])`.
//!
//! The incremental path only accepts the exact next version; a gap is an
//! integrity violation rather than an out-of-order fold.
//!
//! ## Integrity
//!
//! Mixed keys, duplicate versions, and tenant disagreement between the
//! partition key, the event's `tenant_code` and a payload `tenantCode` are all
//! reported as [`DomainError::IntegrityViolation`] and never repaired.

use std::sync::Arc;

use keystone_core::{
    DomainError, DomainResult, KeyCodec, TenantCode, VERSION_FIRST, make_id, parse_history_sk,
};

use crate::event::{CommandEvent, EventKind, PAYLOAD_TENANT_FIELD, Payload};
use crate::snapshot::DataSnapshot;

/// Stateless fold of command events into snapshots.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    codec: Arc<KeyCodec>,
}

impl Projector {
    pub fn new(codec: Arc<KeyCodec>) -> Self {
        Self { codec }
    }

    /// Visible projection of a full history (`None` if empty or deleted).
    pub fn project(&self, events: &[CommandEvent]) -> DomainResult<Option<DataSnapshot>> {
        Ok(self.fold(events)?.and_then(DataSnapshot::into_visible))
    }

    /// Fold a full history, keeping a tombstone when the last event deletes.
    ///
    /// `None` only for an empty history.
    pub fn fold(&self, events: &[CommandEvent]) -> DomainResult<Option<DataSnapshot>> {
        let mut ordered: Vec<&CommandEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.version);

        let Some((first, rest)) = ordered.split_first() else {
            return Ok(None);
        };

        let mut snapshot = self.start(first)?;
        for event in rest {
            if event.version == snapshot.version {
                return Err(DomainError::integrity(format!(
                    "duplicate version {} in history of {}",
                    event.version, snapshot.id
                )));
            }
            snapshot = self.step(snapshot, event)?;
        }
        Ok(Some(snapshot))
    }

    /// Visible result of applying one event over the stored snapshot cell.
    pub fn apply_incremental(
        &self,
        previous: Option<&DataSnapshot>,
        event: &CommandEvent,
    ) -> DomainResult<Option<DataSnapshot>> {
        Ok(self.fold_incremental(previous, event)?.into_visible())
    }

    /// Apply one event over the stored snapshot cell (tombstones included).
    ///
    /// `previous` must be the cell for the same key at exactly
    /// `event.version - 1`, or `None` when `event` is the first event.
    pub fn fold_incremental(
        &self,
        previous: Option<&DataSnapshot>,
        event: &CommandEvent,
    ) -> DomainResult<DataSnapshot> {
        match previous {
            None => {
                if event.version != VERSION_FIRST {
                    return Err(DomainError::integrity(format!(
                        "cannot start {} at version {} (expected {VERSION_FIRST})",
                        make_id(&event.pk, &event.sk),
                        event.version
                    )));
                }
                self.start(event)
            }
            Some(prev) => {
                if Some(event.version) != prev.version.checked_add(1) {
                    return Err(DomainError::integrity(format!(
                        "version gap on {}: snapshot at {}, event at {}",
                        prev.id, prev.version, event.version
                    )));
                }
                self.step(prev.clone(), event)
            }
        }
    }

    fn start(&self, event: &CommandEvent) -> DomainResult<DataSnapshot> {
        self.check_tenant(event)?;

        let sk = parse_history_sk(&event.sk).base_sk;
        let mut data = Payload::new();
        merge_shallow(&mut data, &event.payload);

        Ok(DataSnapshot {
            id: make_id(&event.pk, &sk),
            pk: event.pk.clone(),
            sk,
            tenant_code: event.tenant_code.clone(),
            version: event.version,
            data,
            created_at: event.timestamp,
            updated_at: event.timestamp,
            created_by: event.actor.clone(),
            updated_by: event.actor.clone(),
            is_deleted: event.kind == EventKind::Delete,
        })
    }

    fn step(&self, mut snapshot: DataSnapshot, event: &CommandEvent) -> DomainResult<DataSnapshot> {
        self.check_tenant(event)?;

        if event.pk != snapshot.pk || parse_history_sk(&event.sk).base_sk != snapshot.sk {
            return Err(DomainError::integrity(format!(
                "event for {} folded into history of {}",
                make_id(&event.pk, &event.sk),
                snapshot.id
            )));
        }
        if event.tenant_code != snapshot.tenant_code {
            return Err(DomainError::integrity(format!(
                "event tenant '{}' differs from snapshot tenant '{}' on {}",
                event.tenant_code, snapshot.tenant_code, snapshot.id
            )));
        }

        merge_shallow(&mut snapshot.data, &event.payload);
        snapshot.version = event.version;
        snapshot.updated_at = event.timestamp;
        snapshot.updated_by = event.actor.clone();
        snapshot.is_deleted = event.kind == EventKind::Delete;
        Ok(snapshot)
    }

    /// The pk tenant, the explicit tenant and any payload tenant must agree.
    fn check_tenant(&self, event: &CommandEvent) -> DomainResult<()> {
        let pk_tenant: TenantCode = self
            .codec
            .tenant_of(&event.pk)
            .map_err(|e| DomainError::integrity(format!("stored event has bad pk: {e}")))?;

        if pk_tenant != event.tenant_code {
            return Err(DomainError::integrity(format!(
                "event tenant '{}' does not match partition key '{}'",
                event.tenant_code, event.pk
            )));
        }
        if let Some(field) = event.payload.get(PAYLOAD_TENANT_FIELD) {
            if field.as_str() != Some(pk_tenant.as_str()) {
                return Err(DomainError::integrity(format!(
                    "payload {PAYLOAD_TENANT_FIELD} {field} does not match partition key '{}'",
                    event.pk
                )));
            }
        }
        Ok(())
    }
}

/// Later keys win; keys missing from `patch` are kept.
pub fn merge_shallow(target: &mut Payload, patch: &Payload) {
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
}
