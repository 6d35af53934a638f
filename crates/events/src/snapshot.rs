use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{Key, TenantCode};

use crate::event::Payload;

/// Current state of one `(pk, sk)`, folded from its event history.
///
/// The snapshot is a materialized view: it can always be regenerated by
/// re-folding the events. A snapshot whose last event was a `DELETE` is kept
/// as a tombstone (`is_deleted = true`) so the version sequence and the merged
/// data survive; readers only ever see [`DataSnapshot::into_visible`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub pk: String,
    pub sk: String,
    pub id: String,
    pub tenant_code: TenantCode,
    /// Version of the last folded event.
    pub version: u64,
    pub data: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl DataSnapshot {
    pub fn key(&self) -> Key {
        Key::new(self.pk.clone(), self.sk.clone())
    }

    pub fn is_visible(&self) -> bool {
        !self.is_deleted
    }

    /// The externally visible form: `None` for a logically deleted key.
    pub fn into_visible(self) -> Option<Self> {
        if self.is_deleted { None } else { Some(self) }
    }
}
