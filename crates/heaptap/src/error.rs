//! Error types for the heaptap extractor.

use snafu::prelude::*;

pub use heaptap_core::error::{ConfigError, StorageError};

/// Errors raised while loading and merging manifests.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ManifestError {
    /// No manifest objects exist under the manifest prefix.
    #[snafu(display("Found no manifest files in {url}/manifests"))]
    NoManifestsFound { url: String },

    /// Failed to list the manifest prefix.
    #[snafu(display("Failed to list manifests: {source}"))]
    ManifestList { source: StorageError },

    /// Failed to read a manifest object.
    #[snafu(display("Failed to read manifest {path}: {source}"))]
    ManifestRead { path: String, source: StorageError },

    /// A manifest object is not valid manifest JSON.
    #[snafu(display("Failed to parse manifest {path}: {source}"))]
    ManifestParse {
        path: String,
        source: serde_json::Error,
    },

    /// Discovery produced no streams.
    #[snafu(display("No streams found"))]
    NoStreamsFound,
}

/// Errors raised while planning which files to sync.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PlanError {
    /// A file path does not follow `sync_<batch>/.../<name with part number>`.
    #[snafu(display("Cannot derive batch and part ids from file path '{path}'"))]
    InvalidFilePath { path: String },
}

/// Errors raised while translating column types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// A column declares a type with no JSON schema equivalent.
    #[snafu(display("Unsupported type '{type_name}' for column '{column}'"))]
    UnsupportedType { column: String, type_name: String },
}

/// Errors that can occur while decoding data files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The file is not a readable Parquet file.
    #[snafu(display("Failed to open {path}: {source}"))]
    ParquetOpen {
        path: String,
        source: parquet::errors::ParquetError,
    },

    /// A record batch could not be decoded.
    #[snafu(display("Failed to decode {path}: {source}"))]
    BatchDecode {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A column could not be converted to JSON values.
    #[snafu(display("Failed to convert column '{column}' in {path}: {message}"))]
    ColumnConvert {
        path: String,
        column: String,
        message: String,
    },

    #[snafu(display("Failed to open {path}: {source}"))]
    AvroOpen {
        path: String,
        source: apache_avro::Error,
    },

    #[snafu(display("Failed to decode {path}: {source}"))]
    AvroDecode {
        path: String,
        source: apache_avro::Error,
    },

    /// The file's top-level schema or datum is not a record.
    #[snafu(display("{path} does not contain records"))]
    NotARecord { path: String },

    /// The file extension names no known format.
    #[snafu(display("No decoder for {path}; expected a .avro or .parquet file"))]
    UnknownFormat { path: String },
}

impl ReaderError {
    /// Structural problems fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ReaderError::NotARecord { .. } | ReaderError::UnknownFormat { .. }
        )
    }
}

/// Errors raised by message sinks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Writing to the output failed.
    #[snafu(display("Failed to write message: {source}"))]
    SinkWrite { source: std::io::Error },

    /// A message could not be serialized.
    #[snafu(display("Failed to serialize message: {source}"))]
    SinkSerialize { source: serde_json::Error },
}

/// Errors raised while loading or persisting checkpoint state.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Reading or writing the state object failed.
    #[snafu(display("Checkpoint storage error: {source}"))]
    CheckpointStorage { source: StorageError },

    /// The state could not be serialized.
    #[snafu(display("Failed to serialize checkpoint state: {source}"))]
    CheckpointSerialize { source: serde_json::Error },

    /// The stored state is not valid JSON for the state schema.
    #[snafu(display("Failed to parse checkpoint state at {path}: {source}"))]
    CheckpointParse {
        path: String,
        source: serde_json::Error,
    },
}

/// Errors raised while reading a catalog document.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    /// Failed to read the catalog file.
    #[snafu(display("Failed to read catalog {path}: {source}"))]
    CatalogRead {
        path: String,
        source: std::io::Error,
    },

    /// The catalog is not valid catalog JSON.
    #[snafu(display("Failed to parse catalog {path}: {source}"))]
    CatalogParse {
        path: String,
        source: serde_json::Error,
    },

    /// Failed to write the catalog.
    #[snafu(display("Failed to write catalog: {source}"))]
    CatalogWrite { source: serde_json::Error },
}

/// Top-level errors for discovery and sync runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error outside of a specific file.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Manifest error.
    #[snafu(display("Manifest error: {source}"))]
    Manifest { source: ManifestError },

    /// Planning error.
    #[snafu(display("Planning error: {source}"))]
    Plan { source: PlanError },

    /// Schema translation error.
    #[snafu(display("Schema error: {source}"))]
    Schema { source: SchemaError },

    /// Reader error.
    #[snafu(display("Reader error: {source}"))]
    Reader { source: ReaderError },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Checkpoint error.
    #[snafu(display("Checkpoint error: {source}"))]
    Checkpoint { source: CheckpointError },

    /// Catalog error.
    #[snafu(display("Catalog error: {source}"))]
    Catalog { source: CatalogError },

    /// Failed to fetch a data file.
    #[snafu(display("Failed to read {path}: {source}"))]
    FileRead { path: String, source: StorageError },

    /// A producer could not enqueue a message within the timeout.
    #[snafu(display("Timed out after {timeout_secs}s waiting for space in the delivery queue"))]
    QueueTimeout { timeout_secs: u64 },

    /// The delivery queue closed while producers were still running.
    #[snafu(display("Delivery queue closed unexpectedly"))]
    QueueClosed,

    /// The run was cancelled by a shutdown signal or a failing sibling.
    #[snafu(display("Sync cancelled"))]
    Cancelled,

    /// Task join error.
    #[snafu(display("Task join error: {source}"))]
    TaskJoin { source: tokio::task::JoinError },

    /// A file worker failed; `source` is the error that stopped it.
    #[snafu(display("Error reading file {path}: {source}"))]
    WorkerFailed {
        path: String,
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Whether re-running the failed file extraction could succeed.
    ///
    /// Unsupported types, bad paths and queue or cancellation failures are
    /// deterministic for this run and end it at once.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::FileRead { source, .. } | PipelineError::Storage { source } => {
                source.is_retryable()
            }
            PipelineError::Reader { source } => source.is_retryable(),
            PipelineError::WorkerFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Innermost error, looking through `WorkerFailed` wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::WorkerFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ManifestError> for PipelineError {
    fn from(source: ManifestError) -> Self {
        PipelineError::Manifest { source }
    }
}

impl From<PlanError> for PipelineError {
    fn from(source: PlanError) -> Self {
        PipelineError::Plan { source }
    }
}

impl From<SchemaError> for PipelineError {
    fn from(source: SchemaError) -> Self {
        PipelineError::Schema { source }
    }
}

impl From<ReaderError> for PipelineError {
    fn from(source: ReaderError) -> Self {
        PipelineError::Reader { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}

impl From<CheckpointError> for PipelineError {
    fn from(source: CheckpointError) -> Self {
        PipelineError::Checkpoint { source }
    }
}

impl From<CatalogError> for PipelineError {
    fn from(source: CatalogError) -> Self {
        PipelineError::Catalog { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_type_is_fatal() {
        let err = PipelineError::from(SchemaError::UnsupportedType {
            column: "payload".to_string(),
            type_name: "map".to_string(),
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_worker_failed_exposes_root() {
        let err = PipelineError::WorkerFailed {
            path: "sync_1/events/part-00000.parquet".to_string(),
            source: Box::new(PipelineError::QueueTimeout { timeout_secs: 120 }),
        };
        assert!(matches!(err.root(), PipelineError::QueueTimeout { .. }));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("sync_1/events/part-00000.parquet"));
    }

    #[test]
    fn test_reader_errors_are_retryable() {
        let err = PipelineError::from(ReaderError::ColumnConvert {
            path: "f".to_string(),
            column: "c".to_string(),
            message: "bad".to_string(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unknown_format_is_fatal() {
        let err = PipelineError::from(ReaderError::UnknownFormat {
            path: "sync_1/events/part-00000.csv".to_string(),
        });
        assert!(!err.is_retryable());
    }
}
