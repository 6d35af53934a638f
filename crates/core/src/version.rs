//! Version counter and optimistic concurrency precondition.

use crate::error::{DomainError, DomainResult};

/// Version stamped on the first event of every key.
pub const VERSION_FIRST: u64 = 0;

/// Version the next write of a key must carry, given its head version.
///
/// `head` is the version of the last accepted event (`None` for a key with no
/// history). A logically deleted key still has a head: re-creating it
/// continues the sequence.
pub fn next_version(head: Option<u64>) -> u64 {
    match head {
        None => VERSION_FIRST,
        Some(v) => v.saturating_add(1),
    }
}

/// Optimistic concurrency check for a submitted version.
///
/// Accepts only the exact next version; anything else is a
/// [`DomainError::Conflict`] carrying the current head.
pub fn check_next_version(head: Option<u64>, submitted: u64) -> DomainResult<()> {
    if head == Some(u64::MAX) {
        return Err(DomainError::integrity("version counter exhausted"));
    }
    if submitted == next_version(head) {
        Ok(())
    } else {
        Err(DomainError::conflict(submitted, head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_must_use_version_first() {
        assert!(check_next_version(None, VERSION_FIRST).is_ok());
        assert_eq!(
            check_next_version(None, 1).unwrap_err(),
            DomainError::conflict(1, None)
        );
    }

    #[test]
    fn later_writes_must_advance_by_one() {
        assert!(check_next_version(Some(1), 2).is_ok());
        assert_eq!(
            check_next_version(Some(1), 1).unwrap_err(),
            DomainError::conflict(1, Some(1))
        );
        assert_eq!(
            check_next_version(Some(1), 3).unwrap_err(),
            DomainError::conflict(3, Some(1))
        );
    }

    #[test]
    fn exhausted_counter_is_an_integrity_error() {
        assert!(matches!(
            check_next_version(Some(u64::MAX), u64::MAX),
            Err(DomainError::IntegrityViolation(_))
        ));
    }
}
