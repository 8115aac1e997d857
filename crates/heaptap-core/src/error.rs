//! Error types shared by the heaptap crates.
//!
//! Storage and configuration errors live here so that both the core plumbing
//! and the extractor can surface them without conversion glue.

use snafu::prelude::*;

/// Failures talking to the export or checkpoint location.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// The URL matches none of the supported schemes.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// Creating a local root directory failed.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// A backend builder rejected its configuration.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    #[snafu(display("Azure configuration error: {source}"))]
    AzureConfig { source: object_store::Error },
}

impl StorageError {
    /// The object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Missing objects, malformed paths and unsupported operations fail the
    /// same way every time; everything else coming back from the store is
    /// treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => !matches!(
                source,
                object_store::Error::NotFound { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::NotSupported { .. }
                    | object_store::Error::NotImplemented
            ),
            StorageError::Io { .. } => true,
            _ => false,
        }
    }
}

/// Failures loading or validating the YAML configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Source url cannot be empty"))]
    EmptySourceUrl,

    #[snafu(display("Checkpoint url cannot be empty"))]
    EmptyCheckpointUrl,

    /// A numeric setting is out of range.
    #[snafu(display("Invalid value for '{field}': {message}"))]
    InvalidValue { field: String, message: String },

    /// One or more `${VAR}` references could not be resolved.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}
