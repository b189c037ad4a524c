//! Pipeline configuration.
//!
//! An explicit, immutable [`PipelineConfig`] value is built once (defaults,
//! optionally overlaid from a JSON file) and passed into each component at
//! construction. There is no process-wide mutable singleton.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::fetch::RetryPolicy;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`PipelineConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Retry behavior for one phase's fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial one.
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier per attempt.
    pub exponential_base: f64,
    /// Per-attempt request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the retry policy described by this configuration.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.exponential_base,
        )
    }
}

/// Batch cadence for one phase's executor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Commit persisted mutations after this many items.
    pub commit_frequency: usize,
    /// Emit a progress log line after this many items.
    pub progress_log_frequency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            commit_frequency: 10,
            progress_log_frequency: 100,
        }
    }
}

/// A discovery source: one classification with its listing endpoint.
///
/// Read-only configuration data; the pipeline never mutates categories.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    /// Classification label assigned to documents found here.
    pub name: String,
    /// Jurisdiction code, the first half of every natural key.
    pub jurisdiction: String,
    /// Paginated listing endpoint for this category.
    pub listing_url: String,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// User-Agent sent on every request.
    pub user_agent: String,
    /// Fixed delay between consecutive remote-touching items, milliseconds.
    pub server_delay_ms: u64,
    /// Circuit breaker: abort a batch after this many consecutive failures.
    pub max_consecutive_errors: u32,
    /// Pagination ceiling per category, guarding against malformed "next
    /// page" signals.
    pub max_pages_per_category: u32,
    /// Per-document failure ceiling before `detail_failed` is declared.
    pub max_document_errors: i64,

    /// Categories to discover.
    pub categories: Vec<Category>,

    /// Retry tuning per phase.
    pub discovery_retry: RetryConfig,
    /// Detail fetches move document bodies, so the default timeout is longer.
    pub detail_retry: RetryConfig,

    /// Batch cadence per phase.
    pub discovery_batch: BatchConfig,
    pub detail_batch: BatchConfig,
    pub relations_batch: BatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("lexgraph/", env!("CARGO_PKG_VERSION")).to_string(),
            server_delay_ms: 500,
            max_consecutive_errors: 5,
            max_pages_per_category: 200,
            max_document_errors: 3,
            categories: Vec::new(),
            discovery_retry: RetryConfig::default(),
            detail_retry: RetryConfig {
                timeout_secs: 60,
                ..RetryConfig::default()
            },
            discovery_batch: BatchConfig::default(),
            detail_batch: BatchConfig::default(),
            relations_batch: BatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a JSON file, falling back to defaults for
    /// omitted fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid configuration JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The delay inserted between remote-touching items.
    #[must_use]
    pub fn server_delay(&self) -> Duration {
        Duration::from_millis(self.server_delay_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.policy().max_retries(), 3);
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.server_delay(), Duration::from_millis(500));
        assert_eq!(config.detail_retry.timeout_secs, 60);
        assert!(config.categories.is_empty());
    }

    #[test]
    fn test_pipeline_config_parses_partial_json() {
        let json = r#"{
            "server_delay_ms": 100,
            "categories": [
                { "name": "laws-in-force", "jurisdiction": "ks",
                  "listing_url": "https://example.com/laws" }
            ],
            "discovery_retry": { "max_retries": 5 }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_delay_ms, 100);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].jurisdiction, "ks");
        assert_eq!(config.discovery_retry.max_retries, 5);
        // Omitted fields keep their defaults
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.discovery_retry.base_delay_ms, 1_000);
    }

    #[test]
    fn test_pipeline_config_rejects_unknown_fields() {
        let json = r#"{ "server_dleay_ms": 100 }"#;
        let result: Result<PipelineConfig, _> = serde_json::from_str(json);
        assert!(result.is_err(), "typo'd field should be rejected");
    }

    #[test]
    fn test_config_from_missing_file_is_io_error() {
        let result = PipelineConfig::from_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
