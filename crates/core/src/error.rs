//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only: malformed keys, rejected versions, tenant
/// denials and integrity breaches. Store transport failures live in the
/// infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A partition or sort key did not have the expected shape.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A value failed validation (e.g. empty tenant code).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic concurrency check failed.
    ///
    /// `current` is the head version of the key at the time of the check
    /// (`None` when the key has no history at all).
    #[error("version conflict (submitted: {submitted}, current: {current:?})")]
    Conflict { submitted: u64, current: Option<u64> },

    /// The caller's tenant does not own the resource.
    #[error("tenant mismatch: {0}")]
    TenantMismatch(String),

    /// Stored history or snapshot state is inconsistent. Never auto-corrected.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A write targeted a resource that does not exist.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(submitted: u64, current: Option<u64>) -> Self {
        Self::Conflict { submitted, current }
    }

    pub fn tenant_mismatch(msg: impl Into<String>) -> Self {
        Self::TenantMismatch(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::IntegrityViolation(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// True when a rejected write may simply have been applied already.
    ///
    /// A retried submit whose first attempt succeeded is rejected because the
    /// head has moved to exactly the submitted version.
    pub fn is_possible_replay(&self) -> bool {
        matches!(self, Self::Conflict { submitted, current: Some(current) } if submitted == current)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
