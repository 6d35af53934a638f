//! Key, version and error primitives shared by every keystone crate.
//!
//! This crate contains **pure** building blocks (no I/O): the PK/SK codec, the
//! version precondition, tenant codes and the caller context.

pub mod context;
pub mod error;
pub mod id;
pub mod key;
pub mod version;

pub use context::TenantContext;
pub use error::{DomainError, DomainResult};
pub use id::{TenantCode, TypePrefix};
pub use key::{
    BUILTIN_TYPE_PREFIXES, HistorySk, KEY_SEPARATOR, Key, KeyCodec, ParsedPk, VER_SEPARATOR,
    history_prefix, make_history_sk, make_id, make_sk, parse_history_sk, validate_base_sk,
};
pub use version::{VERSION_FIRST, check_next_version, next_version};
