//! Partition / sort key codec.
//!
//! Every record is addressed by a composite `(pk, sk)`:
//!
//! - `pk` = `{TYPE}#{tenantCode}`, e.g. `MASTER#ACME`
//! - `sk` = `#`-joined segments, e.g. `CATEGORY#DATA_CODE`
//! - history `sk` = `{baseSk}@{version}`, addressing one event of the key
//! - `id` = `{pk}#{baseSk}`, the external identifier of the current state
//!
//! This module is the only place that builds or splits these strings.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{TenantCode, TypePrefix};

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '#';

/// Separator between a base sort key and its version.
pub const VER_SEPARATOR: char = '@';

/// Type prefixes every codec knows about.
pub const BUILTIN_TYPE_PREFIXES: &[&str] = &[
    "MASTER",
    "SETTING",
    "SEQUENCE",
    "SEQ",
    "TASK",
    "DIRECTORY",
    "TENANT",
];

/// Composite address of a current-state record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub pk: String,
    pub sk: String,
}

impl Key {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// External identifier (`{pk}#{baseSk}`).
    pub fn id(&self) -> String {
        make_id(&self.pk, &self.sk)
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}|{}", self.pk, self.sk)
    }
}

/// Decoded partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPk {
    pub type_prefix: TypePrefix,
    pub tenant_code: TenantCode,
}

/// Decoded (possibly versioned) sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySk {
    pub base_sk: String,
    /// `None` means "current", not version 0.
    pub version: Option<u64>,
}

/// Builds and parses partition keys against a registry of type prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefixes: BTreeSet<TypePrefix>,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::with_builtin_prefixes()
    }
}

impl KeyCodec {
    /// Codec pre-loaded with [`BUILTIN_TYPE_PREFIXES`].
    pub fn with_builtin_prefixes() -> Self {
        let prefixes = BUILTIN_TYPE_PREFIXES
            .iter()
            .filter_map(|p| TypePrefix::new(*p).ok())
            .collect();
        Self { prefixes }
    }

    /// Register an additional type prefix. Re-registering is a no-op.
    pub fn register(&mut self, prefix: impl Into<String>) -> DomainResult<()> {
        self.insert(TypePrefix::new(prefix)?);
        Ok(())
    }

    /// Register an already validated prefix.
    pub fn insert(&mut self, prefix: TypePrefix) {
        self.prefixes.insert(prefix);
    }

    pub fn is_registered(&self, prefix: &str) -> bool {
        self.prefixes.iter().any(|p| p.as_str() == prefix)
    }

    /// Build a partition key. The only correct way to produce one.
    pub fn make_pk(&self, type_prefix: &str, tenant_code: &TenantCode) -> DomainResult<String> {
        if !self.is_registered(type_prefix) {
            return Err(DomainError::invalid_key(format!(
                "unregistered type prefix '{type_prefix}'"
            )));
        }
        Ok(format!("{type_prefix}{KEY_SEPARATOR}{tenant_code}"))
    }

    /// Split a partition key into type prefix and tenant code.
    ///
    /// Anything other than exactly one separator is a caller bug.
    pub fn parse_pk(&self, pk: &str) -> DomainResult<ParsedPk> {
        let separators = pk.matches(KEY_SEPARATOR).count();
        if separators != 1 {
            return Err(DomainError::invalid_key(format!(
                "partition key '{pk}' must contain exactly one '{KEY_SEPARATOR}', \
                 found {separators}"
            )));
        }
        let (prefix, tenant) = pk
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| {
                DomainError::invalid_key(format!("partition key '{pk}' has no separator"))
            })?;

        if !self.is_registered(prefix) {
            return Err(DomainError::invalid_key(format!(
                "partition key '{pk}' uses unregistered type prefix '{prefix}'"
            )));
        }
        let type_prefix = TypePrefix::new(prefix)
            .map_err(|e| DomainError::invalid_key(format!("partition key '{pk}': {e}")))?;
        let tenant_code = TenantCode::new(tenant)
            .map_err(|e| DomainError::invalid_key(format!("partition key '{pk}': {e}")))?;

        Ok(ParsedPk {
            type_prefix,
            tenant_code,
        })
    }

    /// Tenant code embedded in a partition key.
    pub fn tenant_of(&self, pk: &str) -> DomainResult<TenantCode> {
        Ok(self.parse_pk(pk)?.tenant_code)
    }
}

/// Join sort-key segments, skipping empty ones.
pub fn make_sk<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sk = String::new();
    for seg in segments {
        let seg = seg.as_ref();
        if seg.is_empty() {
            continue;
        }
        if !sk.is_empty() {
            sk.push(KEY_SEPARATOR);
        }
        sk.push_str(seg);
    }
    sk
}

/// Identifier of the current-state record for `(pk, sk)`.
pub fn make_id(pk: &str, sk: &str) -> String {
    format!("{pk}{KEY_SEPARATOR}{}", parse_history_sk(sk).base_sk)
}

/// Sort key addressing `version` of `sk`. An existing suffix is replaced.
pub fn make_history_sk(sk: &str, version: u64) -> String {
    format!("{}{VER_SEPARATOR}{version}", parse_history_sk(sk).base_sk)
}

/// Prefix shared by every history sort key of `base_sk`.
pub fn history_prefix(base_sk: &str) -> String {
    format!("{base_sk}{VER_SEPARATOR}")
}

/// Split a sort key into base and version.
///
/// Never fails: a missing or non-numeric suffix yields the input as base with
/// no version, so malformed keys cannot take down a read path.
pub fn parse_history_sk(sk: &str) -> HistorySk {
    if let Some((base, suffix)) = sk.rsplit_once(VER_SEPARATOR) {
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(version) = suffix.parse::<u64>() {
                return HistorySk {
                    base_sk: base.to_string(),
                    version: Some(version),
                };
            }
        }
    }
    HistorySk {
        base_sk: sk.to_string(),
        version: None,
    }
}

/// Check that `sk` is usable as a base sort key.
pub fn validate_base_sk(sk: &str) -> DomainResult<()> {
    if sk.is_empty() {
        return Err(DomainError::invalid_key("sort key must not be empty"));
    }
    if sk.contains(VER_SEPARATOR) {
        return Err(DomainError::invalid_key(format!(
            "sort key '{sk}' must not contain the reserved '{VER_SEPARATOR}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenant(code: &str) -> TenantCode {
        TenantCode::new(code).unwrap()
    }

    #[test]
    fn make_pk_joins_prefix_and_tenant() {
        let codec = KeyCodec::default();
        assert_eq!(codec.make_pk("MASTER", &tenant("ACME")).unwrap(), "MASTER#ACME");
        assert_eq!(codec.make_pk("SETTING", &tenant("ACME")).unwrap(), "SETTING#ACME");
    }

    #[test]
    fn make_pk_rejects_unregistered_prefix() {
        let codec = KeyCodec::default();
        let err = codec.make_pk("USER", &tenant("ACME")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidKey(_)));
    }

    #[test]
    fn registered_prefix_becomes_usable() {
        let mut codec = KeyCodec::default();
        codec.register("MASTER_SETTING").unwrap();
        assert_eq!(
            codec.make_pk("MASTER_SETTING", &tenant("T1")).unwrap(),
            "MASTER_SETTING#T1"
        );
        assert!(codec.register("lower").is_err());
    }

    #[test]
    fn parse_pk_splits_type_and_tenant() {
        let codec = KeyCodec::default();
        let parsed = codec.parse_pk("MASTER#ACME").unwrap();
        assert_eq!(parsed.type_prefix, "MASTER");
        assert_eq!(parsed.tenant_code, "ACME");
    }

    #[test]
    fn parse_pk_requires_exactly_one_separator() {
        let codec = KeyCodec::default();
        for bad in ["MASTER#ACME#EXTRA", "MASTERACME", "MASTER#", "#ACME", "USER#ACME"] {
            let err = codec.parse_pk(bad).unwrap_err();
            assert!(matches!(err, DomainError::InvalidKey(_)), "{bad} should be invalid");
        }
    }

    #[test]
    fn make_sk_skips_empty_segments() {
        assert_eq!(make_sk(["CATEGORY", "DATA_CODE"]), "CATEGORY#DATA_CODE");
        assert_eq!(make_sk(["ORDER", "", "202403"]), "ORDER#202403");
        assert_eq!(make_sk(["", "TASK-001", ""]), "TASK-001");
        assert_eq!(make_sk(Vec::<String>::new()), "");
    }

    #[test]
    fn make_id_uses_base_sort_key() {
        assert_eq!(
            make_id("DIRECTORY#COMPANY_X", "folder-ulid-123"),
            "DIRECTORY#COMPANY_X#folder-ulid-123"
        );
        assert_eq!(make_id("MASTER#T", "PROD#001@4"), "MASTER#T#PROD#001");
    }

    #[test]
    fn history_sk_appends_and_replaces_version() {
        assert_eq!(make_history_sk("PRODUCT#SKU001", 5), "PRODUCT#SKU001@5");
        assert_eq!(make_history_sk("DOCUMENT#DOC001", 0), "DOCUMENT#DOC001@0");
        assert_eq!(make_history_sk("PRODUCT#SKU001@5", 6), "PRODUCT#SKU001@6");
    }

    #[test]
    fn parse_history_sk_handles_current_and_malformed() {
        let current = parse_history_sk("PRODUCT#SKU001");
        assert_eq!(current.base_sk, "PRODUCT#SKU001");
        assert_eq!(current.version, None);

        let zero = parse_history_sk("ITEM#001@0");
        assert_eq!(zero.base_sk, "ITEM#001");
        assert_eq!(zero.version, Some(0));

        for malformed in ["ITEM@", "ITEM@abc", "ITEM@-1", "ITEM@99999999999999999999999"] {
            let parsed = parse_history_sk(malformed);
            assert_eq!(parsed.base_sk, malformed);
            assert_eq!(parsed.version, None);
        }
    }

    #[test]
    fn base_sort_key_validation() {
        assert!(validate_base_sk("PROD#001").is_ok());
        assert!(validate_base_sk("").is_err());
        assert!(validate_base_sk("PROD#001@1").is_err());
    }

    fn tenant_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,16}"
    }

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[A-Z0-9_-]{1,10}"
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: parse_pk inverts make_pk for every registered prefix.
        #[test]
        fn pk_round_trip(
            prefix_idx in 0usize..BUILTIN_TYPE_PREFIXES.len(),
            raw_tenant in tenant_strategy(),
        ) {
            let codec = KeyCodec::default();
            let prefix = BUILTIN_TYPE_PREFIXES[prefix_idx];
            let tenant = TenantCode::new(raw_tenant).unwrap();

            let parsed = codec.parse_pk(&codec.make_pk(prefix, &tenant).unwrap()).unwrap();
            prop_assert_eq!(parsed.type_prefix.as_str(), prefix);
            prop_assert_eq!(parsed.tenant_code, tenant);
        }

        /// Property: parse_history_sk inverts make_history_sk.
        #[test]
        fn history_sk_round_trip(
            segments in prop::collection::vec(segment_strategy(), 1..4),
            version in any::<u64>(),
        ) {
            let base = make_sk(&segments);
            let parsed = parse_history_sk(&make_history_sk(&base, version));
            prop_assert_eq!(parsed.base_sk, base);
            prop_assert_eq!(parsed.version, Some(version));
        }

        /// Property: the same sort key under two tenants never shares an id.
        #[test]
        fn ids_are_tenant_unique(
            a in tenant_strategy(),
            b in tenant_strategy(),
            segments in prop::collection::vec(segment_strategy(), 1..4),
        ) {
            prop_assume!(a != b);
            let codec = KeyCodec::default();
            let sk = make_sk(&segments);
            let pk_a = codec.make_pk("MASTER", &TenantCode::new(a).unwrap()).unwrap();
            let pk_b = codec.make_pk("MASTER", &TenantCode::new(b).unwrap()).unwrap();
            let (id_a, id_b) = (make_id(&pk_a, &sk), make_id(&pk_b, &sk));
            prop_assert_ne!(id_a, id_b);
        }
    }
}
