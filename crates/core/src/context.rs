//! Caller context passed explicitly into every operation.

use crate::id::TenantCode;

/// Authenticated caller of a core operation.
///
/// Built by the transport layer from its credentials and handed to every read
/// or write; the core never looks it up from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_code: TenantCode,
    actor: Option<String>,
    request_id: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_code: TenantCode) -> Self {
        Self {
            tenant_code,
            actor: None,
            request_id: None,
        }
    }

    /// Identity recorded as `created_by` / `updated_by`.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn tenant_code(&self) -> &TenantCode {
        &self.tenant_code
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}
