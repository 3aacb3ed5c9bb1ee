//! Engine and client configuration.
//!
//! `EngineConfig` can be loaded from JSON; durations are given in
//! milliseconds:
//!
//! ```json
//! {
//!   "search_debounce_ms": 300,
//!   "min_search_len": 3,
//!   "operation_timeout_ms": 30000,
//!   "bulk_failure_policy": "conflict_implies_already_applied",
//!   "readonly": false
//! }
//! ```
//!
//! `"operation_timeout_ms": null` disables the operation timeout.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::filter::{MIN_SEARCH_LEN, SEARCH_DEBOUNCE};
use crate::policy::BulkFailurePolicy;

/// Default bound on one assign/unassign/bulk request.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub search_debounce: Duration,
    pub min_search_len: usize,
    /// `None` lets a hung request hold the operation lock indefinitely.
    pub operation_timeout: Option<Duration>,
    pub bulk_failure_policy: BulkFailurePolicy,
    pub readonly: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_debounce: SEARCH_DEBOUNCE,
            min_search_len: MIN_SEARCH_LEN,
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            bulk_failure_policy: BulkFailurePolicy::default(),
            readonly: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawEngineConfig {
    search_debounce_ms: u64,
    min_search_len: usize,
    operation_timeout_ms: Option<u64>,
    bulk_failure_policy: BulkFailurePolicy,
    readonly: bool,
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            search_debounce_ms: defaults.search_debounce.as_millis() as u64,
            min_search_len: defaults.min_search_len,
            operation_timeout_ms: defaults.operation_timeout.map(|d| d.as_millis() as u64),
            bulk_failure_policy: defaults.bulk_failure_policy,
            readonly: defaults.readonly,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawEngineConfig = serde_json::from_str(json)?;
        if raw.min_search_len == 0 {
            return Err(ConfigError::Invalid(
                "min_search_len must be at least 1".to_string(),
            ));
        }
        if raw.operation_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be positive or null".to_string(),
            ));
        }
        Ok(Self {
            search_debounce: Duration::from_millis(raw.search_debounce_ms),
            min_search_len: raw.min_search_len,
            operation_timeout: raw.operation_timeout_ms.map(Duration::from_millis),
            bulk_failure_policy: raw.bulk_failure_policy,
            readonly: raw.readonly,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Configuration for the REST transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
    /// Page size for catalog requests. Further pages are fetched while the
    /// server reports more elements.
    pub catalog_page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            catalog_page_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.search_debounce, Duration::from_millis(300));
        assert_eq!(config.min_search_len, 3);
    }

    #[test]
    fn parse_overrides() {
        let json = r#"{
            "search_debounce_ms": 150,
            "operation_timeout_ms": null,
            "bulk_failure_policy": "strict",
            "readonly": true
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.search_debounce, Duration::from_millis(150));
        assert_eq!(config.operation_timeout, None);
        assert_eq!(config.bulk_failure_policy, BulkFailurePolicy::Strict);
        assert!(config.readonly);
    }

    #[test]
    fn reject_invalid_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"min_search_len":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"operation_timeout_ms":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"debounce":1}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = EngineConfig::load(Path::new("/nonexistent/assign-sync.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/assign-sync.json"));
    }
}
