use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use keystone_core::{DomainError, DomainResult, Key, TenantCode, make_history_sk, make_id};

/// Opaque key/value body of a command, merged into the snapshot's `data`.
pub type Payload = serde_json::Map<String, JsonValue>;

/// Payload field that, when present, must name the owning tenant.
pub const PAYLOAD_TENANT_FIELD: &str = "tenantCode";

/// Convert a JSON value into a payload. Only objects are accepted.
pub fn payload_from_value(value: JsonValue) -> DomainResult<Payload> {
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Payload::new()),
        other => Err(DomainError::validation(format!(
            "payload must be a JSON object, got {other}"
        ))),
    }
}

/// What an accepted write did to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    /// Kind of a write given whether the key is currently visible.
    pub fn for_write(is_deleted: bool, has_visible_snapshot: bool) -> Self {
        if is_deleted {
            EventKind::Delete
        } else if has_visible_snapshot {
            EventKind::Update
        } else {
            EventKind::Create
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "CREATE",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
        }
    }
}

/// One accepted write, as recorded in the append-only history.
///
/// Events are:
/// - **immutable** once appended
/// - stored under `(pk, {sk}@{version})`
/// - the source of truth the snapshot is folded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    pub event_id: Uuid,
    pub pk: String,
    /// Base sort key (never carries a version suffix).
    pub sk: String,
    pub version: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub tenant_code: TenantCode,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CommandEvent {
    pub fn key(&self) -> Key {
        Key::new(self.pk.clone(), self.sk.clone())
    }

    pub fn id(&self) -> String {
        make_id(&self.pk, &self.sk)
    }

    /// Sort key this event is stored under.
    pub fn history_sk(&self) -> String {
        make_history_sk(&self.sk, self.version)
    }

    pub fn is_delete(&self) -> bool {
        self.kind == EventKind::Delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_follows_visibility_and_delete_flag() {
        assert_eq!(EventKind::for_write(false, false), EventKind::Create);
        assert_eq!(EventKind::for_write(false, true), EventKind::Update);
        assert_eq!(EventKind::for_write(true, true), EventKind::Delete);
        assert_eq!(EventKind::for_write(true, false), EventKind::Delete);
    }

    #[test]
    fn payload_must_be_an_object() {
        assert_eq!(payload_from_value(json!({"a": 1})).unwrap().len(), 1);
        assert!(payload_from_value(JsonValue::Null).unwrap().is_empty());
        assert!(payload_from_value(json!([1, 2])).is_err());
        assert!(payload_from_value(json!("x")).is_err());
    }

    #[test]
    fn event_serializes_with_store_field_names() {
        let ev = CommandEvent {
            event_id: Uuid::nil(),
            pk: "MASTER#T".to_string(),
            sk: "PROD#001".to_string(),
            version: 2,
            kind: EventKind::Update,
            timestamp: Utc::now(),
            tenant_code: TenantCode::new("T").unwrap(),
            payload: payload_from_value(json!({"price": 120})).unwrap(),
            actor: None,
            request_id: None,
        };

        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["type"], "UPDATE");
        assert_eq!(value["tenantCode"], "T");
        assert!(value.get("actor").is_none());
        assert_eq!(ev.history_sk(), "PROD#001@2");
        assert_eq!(ev.id(), "MASTER#T#PROD#001");

        let back: CommandEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, ev);
    }
}
