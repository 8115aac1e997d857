//! Internal events for heaptap metrics emission.
//!
//! Each event struct represents a measurable occurrence during discovery or
//! sync. Per-table events carry a `stream` label.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Storage operation type.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    List,
    Put,
    Rename,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::List => "list",
            StorageOperation::Put => "put",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Outcome of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for every storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "heaptap_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the latency of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "heaptap_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a failed operation is about to be retried.
pub struct RetryAttempted {
    pub operation: String,
}

impl InternalEvent for RetryAttempted {
    fn emit(self) {
        trace!(operation = %self.operation, "Retry attempted");
        counter!("heaptap_retries_total", "operation" => self.operation).increment(1);
    }
}

/// Event emitted after manifests are merged.
pub struct ManifestsLoaded {
    pub count: u64,
}

impl InternalEvent for ManifestsLoaded {
    fn emit(self) {
        trace!(count = self.count, "Manifests loaded");
        counter!("heaptap_manifests_loaded_total").increment(self.count);
    }
}

/// Event emitted when a sync plan is computed for a table.
pub struct FilesPlanned {
    pub stream: String,
    pub count: u64,
}

impl InternalEvent for FilesPlanned {
    fn emit(self) {
        trace!(count = self.count, stream = %self.stream, "Files planned");
        counter!("heaptap_files_planned_total", "stream" => self.stream).increment(self.count);
    }
}

/// Status of an extracted file.
#[derive(Debug, Clone, Copy)]
pub enum FileStatus {
    Success,
    Retried,
    Failed,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Retried => "retried",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a worker finishes (or gives up on) a file.
pub struct FileExtracted {
    pub stream: String,
    pub status: FileStatus,
}

impl InternalEvent for FileExtracted {
    fn emit(self) {
        trace!(status = self.status.as_str(), stream = %self.stream, "File extracted");
        counter!(
            "heaptap_files_extracted_total",
            "status" => self.status.as_str(),
            "stream" => self.stream
        )
        .increment(1);
    }
}

/// Event emitted when records are handed to the sink.
pub struct RecordsEmitted {
    pub stream: String,
    pub count: u64,
}

impl InternalEvent for RecordsEmitted {
    fn emit(self) {
        trace!(count = self.count, stream = %self.stream, "Records emitted");
        counter!("heaptap_records_emitted_total", "stream" => self.stream).increment(self.count);
    }
}

/// Event emitted after a bookmark is persisted.
pub struct CheckpointSaved {
    pub stream: String,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(stream = %self.stream, "Checkpoint saved");
        counter!("heaptap_checkpoints_saved_total", "stream" => self.stream).increment(1);
    }
}

/// Event emitted when a table version is activated downstream.
pub struct VersionActivated {
    pub stream: String,
}

impl InternalEvent for VersionActivated {
    fn emit(self) {
        trace!(stream = %self.stream, "Version activated");
        counter!("heaptap_versions_activated_total", "stream" => self.stream).increment(1);
    }
}
