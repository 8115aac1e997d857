//! Configuration for the heaptap extractor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use heaptap_core::RetryPolicy;
use heaptap_core::config::{load_yaml, parse_yaml};

use crate::checkpoint::DEFAULT_STATE_FILE;
use crate::error::ConfigError;
use crate::source::DEFAULT_BATCH_SIZE;

/// Where the export lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Export root (supports S3, GCS, Azure, local).
    pub url: String,
    /// Storage options (credentials, region, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
    /// Retry policy for manifest and data file reads.
    #[serde(default)]
    pub read_retry: RetryPolicy,
}

/// Where checkpoint state is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Directory holding the state object (supports S3, GCS, Azure, local).
    pub url: String,
    /// Name of the state object under `url`.
    #[serde(default = "default_state_file")]
    pub file_name: String,
    /// Storage options for the checkpoint location.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

/// Tuning for the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Files extracted in parallel, and files per checkpoint.
    #[serde(default = "default_batch_width")]
    pub batch_width: usize,
    /// Capacity of the delivery queue, in messages.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long a producer may wait for queue space before the run fails.
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
    /// Rows decoded per record batch.
    #[serde(default = "default_decode_batch_size")]
    pub decode_batch_size: usize,
    /// Retry policy for whole-file extraction.
    #[serde(default = "default_file_retry")]
    pub file_retry: RetryPolicy,
}

fn default_batch_width() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    20_000
}

fn default_queue_timeout_secs() -> u64 {
    120
}

fn default_decode_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_file_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(60))
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_width: default_batch_width(),
            queue_capacity: default_queue_capacity(),
            queue_timeout_secs: default_queue_timeout_secs(),
            decode_batch_size: default_decode_batch_size(),
            file_retry: default_file_retry(),
        }
    }
}

impl ExtractionConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

/// Main configuration for heaptap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Config = load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.url.is_empty() {
            return Err(ConfigError::EmptySourceUrl);
        }
        if self.checkpoint.url.is_empty() {
            return Err(ConfigError::EmptyCheckpointUrl);
        }
        if self.checkpoint.file_name.is_empty() {
            return Err(invalid("checkpoint.file_name", "must not be empty"));
        }
        let extraction = &self.extraction;
        if extraction.batch_width == 0 {
            return Err(invalid("extraction.batch_width", "must be at least 1"));
        }
        if extraction.queue_capacity == 0 {
            return Err(invalid("extraction.queue_capacity", "must be at least 1"));
        }
        if extraction.queue_timeout_secs == 0 {
            return Err(invalid("extraction.queue_timeout_secs", "must be at least 1"));
        }
        if extraction.decode_batch_size == 0 {
            return Err(invalid("extraction.decode_batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
source:
  url: s3://heap-export-bucket
checkpoint:
  url: /var/lib/heaptap
"#,
        )
        .unwrap();

        assert_eq!(config.source.url, "s3://heap-export-bucket");
        assert_eq!(config.source.read_retry, RetryPolicy::default());
        assert_eq!(config.checkpoint.file_name, "state.json");
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(config.extraction.batch_width, 5);
        assert_eq!(config.extraction.queue_capacity, 20_000);
        assert_eq!(config.extraction.queue_timeout(), Duration::from_secs(120));
        assert_eq!(config.extraction.file_retry.max_attempts, 3);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
source:
  url: gs://exports/heap
  storage_options:
    google_service_account: /etc/sa.json
  read_retry: { max_attempts: 2, base_delay_ms: 100, max_delay_ms: 1000 }
checkpoint:
  url: s3://state-bucket/heaptap
  file_name: heap.json
extraction:
  batch_width: 8
  queue_capacity: 100
  queue_timeout_secs: 5
  decode_batch_size: 256
  file_retry: { max_attempts: 1 }
"#,
        )
        .unwrap();

        assert_eq!(config.source.read_retry.max_attempts, 2);
        assert_eq!(
            config.source.storage_options.get("google_service_account"),
            Some(&"/etc/sa.json".to_string())
        );
        assert_eq!(config.checkpoint.file_name, "heap.json");
        assert_eq!(config.extraction.batch_width, 8);
        assert_eq!(config.extraction.file_retry.max_attempts, 1);
        assert_eq!(config.extraction.file_retry.base_delay_ms, 10_000);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = Config::parse(
            r#"
source:
  url: s3://bucket
  bucket: nope
checkpoint:
  url: /tmp
"#,
        );
        assert!(matches!(result, Err(ConfigError::YamlParse { .. })));
    }

    #[test]
    fn test_validation() {
        let result = Config::parse(
            r#"
source:
  url: ""
checkpoint:
  url: /tmp
"#,
        );
        assert!(matches!(result, Err(ConfigError::EmptySourceUrl)));

        let result = Config::parse(
            r#"
source:
  url: s3://bucket
checkpoint:
  url: /tmp
extraction:
  batch_width: 0
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "extraction.batch_width"
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.yaml");
        std::fs::write(&path, "source:\n  url: /data\ncheckpoint:\n  url: /state\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.source.url, "/data");
        assert!(Config::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
