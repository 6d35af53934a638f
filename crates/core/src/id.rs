//! Strongly-typed codes used to build keys.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::key::{KEY_SEPARATOR, VER_SEPARATOR};

/// Code of a tenant (multi-tenant boundary).
///
/// Embedded verbatim in every partition key, so it can never contain the key
/// or version separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantCode(String);

/// Registered partition-key type prefix (`MASTER`, `SETTING`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypePrefix(String);

fn validate_tenant_code(raw: &str) -> DomainResult<()> {
    if raw.is_empty() {
        return Err(DomainError::validation("tenant code must not be empty"));
    }
    if raw.contains(KEY_SEPARATOR) || raw.contains(VER_SEPARATOR) {
        return Err(DomainError::validation(format!(
            "tenant code '{raw}' must not contain '{KEY_SEPARATOR}' or '{VER_SEPARATOR}'"
        )));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!(
            "tenant code '{raw}' must not contain whitespace"
        )));
    }
    Ok(())
}

fn validate_type_prefix(raw: &str) -> DomainResult<()> {
    if raw.is_empty() {
        return Err(DomainError::validation("type prefix must not be empty"));
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(DomainError::validation(format!(
            "type prefix '{raw}' must be upper-case ASCII letters, digits or '_'"
        )));
    }
    Ok(())
}

macro_rules! impl_code_newtype {
    ($t:ident, $validate:path) => {
        impl $t {
            /// Validate and wrap a raw code.
            pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
                let raw = raw.into();
                $validate(&raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl PartialEq<str> for $t {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $t {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

impl_code_newtype!(TenantCode, validate_tenant_code);
impl_code_newtype!(TypePrefix, validate_type_prefix);
