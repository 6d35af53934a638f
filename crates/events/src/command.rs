use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use keystone_core::{
    DomainError, DomainResult, Key, KeyCodec, TenantCode, TenantContext, VERSION_FIRST,
    validate_base_sk,
};

use crate::event::{CommandEvent, EventKind, PAYLOAD_TENANT_FIELD, Payload, payload_from_value};

/// One versioned write intent.
///
/// `version` is the version the resulting event will be stamped with: the
/// first write of a key carries [`VERSION_FIRST`], and every later write the
/// head version plus one. Callers bump their local copy after each accepted
/// write.
///
/// A command with `is_deleted` set is an ordinary versioned write whose event
/// kind is `DELETE`; the key and its history stay in place.
///
/// Commands are only built through [`VersionedCommandBuilder`], which checks
/// the key shape and that the partition key, the explicit tenant code and any
/// `tenantCode` payload field all agree.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedCommand {
    pk: String,
    sk: String,
    version: u64,
    payload: Payload,
    tenant_code: TenantCode,
    is_deleted: bool,
}

impl VersionedCommand {
    pub fn builder() -> VersionedCommandBuilder {
        VersionedCommandBuilder::default()
    }

    pub fn pk(&self) -> &str {
        &self.pk
    }

    pub fn sk(&self) -> &str {
        &self.sk
    }

    pub fn key(&self) -> Key {
        Key::new(self.pk.clone(), self.sk.clone())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn tenant_code(&self) -> &TenantCode {
        &self.tenant_code
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Turn an accepted command into the event that records it.
    pub fn into_event(
        self,
        kind: EventKind,
        ctx: &TenantContext,
        timestamp: DateTime<Utc>,
    ) -> CommandEvent {
        CommandEvent {
            event_id: Uuid::now_v7(),
            pk: self.pk,
            sk: self.sk,
            version: self.version,
            kind,
            timestamp,
            tenant_code: self.tenant_code,
            payload: self.payload,
            actor: ctx.actor().map(str::to_string),
            request_id: ctx.request_id().map(str::to_string),
        }
    }
}

/// Builder for [`VersionedCommand`].
#[derive(Debug, Clone)]
pub struct VersionedCommandBuilder {
    pk: Option<String>,
    sk: Option<String>,
    version: u64,
    payload: JsonValue,
    tenant_code: Option<String>,
    is_deleted: bool,
}

impl Default for VersionedCommandBuilder {
    fn default() -> Self {
        Self {
            pk: None,
            sk: None,
            version: VERSION_FIRST,
            payload: JsonValue::Object(Payload::new()),
            tenant_code: None,
            is_deleted: false,
        }
    }
}

impl VersionedCommandBuilder {
    pub fn pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    pub fn sk(mut self, sk: impl Into<String>) -> Self {
        self.sk = Some(sk.into());
        self
    }

    pub fn key(self, key: &Key) -> Self {
        self.pk(key.pk.clone()).sk(key.sk.clone())
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Payload body; must be a JSON object (checked in `build`).
    pub fn payload(mut self, payload: impl Into<JsonValue>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Explicit tenant code. Defaults to the tenant embedded in the pk.
    pub fn tenant_code(mut self, tenant_code: impl Into<String>) -> Self {
        self.tenant_code = Some(tenant_code.into());
        self
    }

    pub fn deleted(mut self, is_deleted: bool) -> Self {
        self.is_deleted = is_deleted;
        self
    }

    pub fn build(self, codec: &KeyCodec) -> DomainResult<VersionedCommand> {
        let pk = self
            .pk
            .ok_or_else(|| DomainError::validation("command pk is required"))?;
        let sk = self
            .sk
            .ok_or_else(|| DomainError::validation("command sk is required"))?;

        let pk_tenant = codec.tenant_of(&pk)?;
        validate_base_sk(&sk)?;

        let tenant_code = match self.tenant_code {
            Some(raw) => TenantCode::new(raw)?,
            None => pk_tenant.clone(),
        };
        if tenant_code != pk_tenant {
            return Err(DomainError::tenant_mismatch(format!(
                "command tenant '{tenant_code}' does not match partition key '{pk}'"
            )));
        }

        let payload = payload_from_value(self.payload)?;
        if let Some(field) = payload.get(PAYLOAD_TENANT_FIELD) {
            if field.as_str() != Some(tenant_code.as_str()) {
                return Err(DomainError::tenant_mismatch(format!(
                    "payload {PAYLOAD_TENANT_FIELD} {field} does not match tenant '{tenant_code}'"
                )));
            }
        }

        Ok(VersionedCommand {
            pk,
            sk,
            version: self.version,
            payload,
            tenant_code,
            is_deleted: self.is_deleted,
        })
    }
}
