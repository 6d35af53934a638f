use std::sync::Arc;

use keystone_core::{DomainError, DomainResult, KeyCodec, TenantCode};

use crate::command::VersionedCommand;
use crate::event::{CommandEvent, PAYLOAD_TENANT_FIELD, Payload};
use crate::snapshot::DataSnapshot;

/// Types that belong to exactly one tenant.
///
/// A tenant-scoped value names its owner three ways: the tenant embedded in
/// its partition key, an explicit `tenant_code`, and optionally a `tenantCode`
/// field in its payload. [`TenantGuard::authorize_resource`] requires all
/// three to name the caller. Subscriptions use the explicit code to filter
/// messages per tenant.
pub trait TenantScoped {
    fn tenant_code(&self) -> &TenantCode;

    fn pk(&self) -> &str;

    /// Payload carried by the resource, if any.
    fn payload(&self) -> Option<&Payload> {
        None
    }
}

impl TenantScoped for CommandEvent {
    fn tenant_code(&self) -> &TenantCode {
        &self.tenant_code
    }

    fn pk(&self) -> &str {
        &self.pk
    }

    fn payload(&self) -> Option<&Payload> {
        Some(&self.payload)
    }
}

impl TenantScoped for DataSnapshot {
    fn tenant_code(&self) -> &TenantCode {
        &self.tenant_code
    }

    fn pk(&self) -> &str {
        &self.pk
    }

    fn payload(&self) -> Option<&Payload> {
        Some(&self.data)
    }
}

impl TenantScoped for VersionedCommand {
    fn tenant_code(&self) -> &TenantCode {
        VersionedCommand::tenant_code(self)
    }

    fn pk(&self) -> &str {
        VersionedCommand::pk(self)
    }

    fn payload(&self) -> Option<&Payload> {
        Some(VersionedCommand::payload(self))
    }
}

/// Tenant isolation check, run before every read and every submit.
///
/// Denies unless the tenant parsed from the partition key equals the caller
/// and, when present, the payload's `tenantCode` equals the caller too. A
/// disagreement between the two is a denial; neither side wins. There is no
/// bypass for system callers here.
#[derive(Debug, Clone, Default)]
pub struct TenantGuard {
    codec: Arc<KeyCodec>,
}

impl TenantGuard {
    pub fn new(codec: Arc<KeyCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Authorize access to `pk` (and its payload, if known) for `caller`.
    ///
    /// A malformed pk is reported as `InvalidKey`, not as a denial.
    pub fn authorize(
        &self,
        pk: &str,
        payload: Option<&Payload>,
        caller: &TenantCode,
    ) -> DomainResult<()> {
        let owner = self.codec.tenant_of(pk)?;
        if &owner != caller {
            tracing::warn!(pk, owner = %owner, caller = %caller, "cross-tenant access denied");
            return Err(DomainError::tenant_mismatch(format!(
                "tenant '{caller}' may not access partition '{pk}'"
            )));
        }

        if let Some(field) = payload.and_then(|p| p.get(PAYLOAD_TENANT_FIELD)) {
            if field.as_str() != Some(caller.as_str()) {
                tracing::warn!(
                    pk,
                    caller = %caller,
                    payload_tenant = %field,
                    "payload tenant denied"
                );
                return Err(DomainError::tenant_mismatch(format!(
                    "payload {PAYLOAD_TENANT_FIELD} {field} does not match tenant '{caller}'"
                )));
            }
        }
        Ok(())
    }

    /// [`TenantGuard::authorize`] plus the resource's explicit tenant code.
    pub fn authorize_resource<R>(&self, resource: &R, caller: &TenantCode) -> DomainResult<()>
    where
        R: TenantScoped + ?Sized,
    {
        self.authorize(resource.pk(), None, caller)?;

        if resource.tenant_code() != caller {
            tracing::warn!(
                pk = resource.pk(),
                tenant = %resource.tenant_code(),
                caller = %caller,
                "resource tenant denied"
            );
            return Err(DomainError::tenant_mismatch(format!(
                "resource tenant '{}' does not match caller '{caller}'",
                resource.tenant_code()
            )));
        }

        self.authorize(resource.pk(), resource.payload(), caller)
    }
}
