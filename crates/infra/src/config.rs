//! Runtime configuration for the persistence core.
//!
//! Everything is read from environment variables with conservative defaults.
//! Malformed values are rejected rather than silently replaced.

use std::time::Duration;

use keystone_core::{KeyCodec, TypePrefix};
use thiserror::Error;

pub const ENV_IO_TIMEOUT_MS: &str = "KEYSTONE_IO_TIMEOUT_MS";
pub const ENV_SKIP_UNCHANGED: &str = "KEYSTONE_SKIP_UNCHANGED";
pub const ENV_RECONCILE_ON_READ: &str = "KEYSTONE_RECONCILE_ON_READ";
pub const ENV_TYPE_PREFIXES: &str = "KEYSTONE_TYPE_PREFIXES";

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Applied to every single item-store call.
    pub io_timeout: Duration,
    /// Return `Unchanged` instead of appending when a write would not change
    /// the visible data.
    pub skip_unchanged: bool,
    /// Catch snapshots up with the event log before returning them. Turning
    /// this off lets readers see a snapshot older than a recorded event until
    /// `reconcile` runs.
    pub reconcile_on_read: bool,
    /// Registered on top of the built-in partition key prefixes.
    pub extra_type_prefixes: Vec<TypePrefix>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
            skip_unchanged: false,
            reconcile_on_read: true,
            extra_type_prefixes: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match lookup(ENV_IO_TIMEOUT_MS) {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| ConfigError::invalid(ENV_IO_TIMEOUT_MS, &raw, format!("{e}")))?;
                if ms == 0 {
                    return Err(ConfigError::invalid(ENV_IO_TIMEOUT_MS, &raw, "must be positive"));
                }
                config.io_timeout = Duration::from_millis(ms);
            }
            None => {
                tracing::debug!(
                    "{ENV_IO_TIMEOUT_MS} not set; using {}ms",
                    DEFAULT_IO_TIMEOUT.as_millis()
                );
            }
        }

        if let Some(raw) = lookup(ENV_SKIP_UNCHANGED) {
            config.skip_unchanged = parse_flag(ENV_SKIP_UNCHANGED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RECONCILE_ON_READ) {
            config.reconcile_on_read = parse_flag(ENV_RECONCILE_ON_READ, &raw)?;
        }

        if let Some(raw) = lookup(ENV_TYPE_PREFIXES) {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let prefix = TypePrefix::new(part)
                    .map_err(|e| ConfigError::invalid(ENV_TYPE_PREFIXES, &raw, e.to_string()))?;
                if !config.extra_type_prefixes.contains(&prefix) {
                    config.extra_type_prefixes.push(prefix);
                }
            }
        }

        if !config.reconcile_on_read {
            tracing::warn!("{ENV_RECONCILE_ON_READ}=false; reads may lag recorded events");
        }

        Ok(config)
    }

    /// Key codec with the built-in prefixes plus the configured extras.
    pub fn key_codec(&self) -> KeyCodec {
        let mut codec = KeyCodec::with_builtin_prefixes();
        for prefix in &self.extra_type_prefixes {
            codec.insert(prefix.clone());
        }
        codec
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(var, raw, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<CoreConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CoreConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.io_timeout, Duration::from_secs(5));
        assert!(config.reconcile_on_read);
    }

    #[test]
    fn values_are_parsed() {
        let config = config_from(&[
            (ENV_IO_TIMEOUT_MS, "250"),
            (ENV_SKIP_UNCHANGED, "true"),
            (ENV_RECONCILE_ON_READ, "off"),
            (ENV_TYPE_PREFIXES, "ORDER, INVOICE,,ORDER"),
        ])
        .unwrap();

        assert_eq!(config.io_timeout, Duration::from_millis(250));
        assert!(config.skip_unchanged);
        assert!(!config.reconcile_on_read);
        assert_eq!(config.extra_type_prefixes.len(), 2);

        let codec = config.key_codec();
        assert!(codec.is_registered("ORDER"));
        assert!(codec.is_registered("INVOICE"));
        assert!(codec.is_registered("MASTER"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[(ENV_IO_TIMEOUT_MS, "soon")]).is_err());
        assert!(config_from(&[(ENV_IO_TIMEOUT_MS, "0")]).is_err());
        assert!(config_from(&[(ENV_SKIP_UNCHANGED, "maybe")]).is_err());
        assert!(config_from(&[(ENV_TYPE_PREFIXES, "order")]).is_err());
    }
}
