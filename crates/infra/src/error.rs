use keystone_core::DomainError;
use thiserror::Error;

use crate::store::StoreError;

/// Error surfaced by the event store, snapshot store and command service.
///
/// Domain failures (conflict, tenant mismatch, integrity) are deterministic and
/// never retried here. Store failures pass through untouched so the caller's
/// retry policy can tell transient ones apart.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.domain().is_some_and(DomainError::is_conflict)
    }

    pub fn is_tenant_mismatch(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::TenantMismatch(_)))
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::IntegrityViolation(_)))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_transient())
    }
}
