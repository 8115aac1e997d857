//! Per-file extraction.

use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use heaptap_core::metrics::events::{FileExtracted, FileStatus, RecordsEmitted};
use heaptap_core::{RetryPolicy, StorageProviderRef, emit, retry_with_backoff};

use super::queue::DeliveryQueue;
use crate::checkpoint::Version;
use crate::error::{CancelledSnafu, FileReadSnafu, PipelineError, ReaderError, TaskJoinSnafu};
use crate::schema::translate;
use crate::sink::Message;
use crate::source::{FileDecoder, RowReader};
use crate::transform::{FieldSelection, Row};

/// Everything a worker needs for one stream, shared by all its workers.
pub(in crate::pipeline) struct WorkerContext {
    pub storage: StorageProviderRef,
    pub decoder: Arc<dyn FileDecoder>,
    pub queue: DeliveryQueue,
    pub shutdown: CancellationToken,
    pub stream: String,
    pub key_properties: Vec<String>,
    pub selection: FieldSelection,
    pub version: Version,
    pub read_retry: RetryPolicy,
    pub file_retry: RetryPolicy,
    /// Rows pulled from the decoder per blocking call.
    pub chunk_size: usize,
}

impl WorkerContext {
    /// Extract one file into the queue. Returns the number of records sent.
    ///
    /// A failed attempt is retried only if it had not sent any record yet,
    /// so retries never duplicate rows.
    pub async fn extract_file(self: Arc<Self>, path: String) -> Result<u64, PipelineError> {
        let records = AtomicU64::new(0);
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(
            &self.file_retry,
            "extract_file",
            Some(&self.shutdown),
            |err: &PipelineError| err.is_retryable() && records.load(Ordering::Relaxed) == 0,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.extract_once(&path, &records)
            },
        )
        .await;

        let records = records.into_inner();
        match result {
            Ok(()) => {
                let status = if attempts.into_inner() > 1 {
                    FileStatus::Retried
                } else {
                    FileStatus::Success
                };
                emit!(FileExtracted {
                    stream: self.stream.clone(),
                    status,
                });
                emit!(RecordsEmitted {
                    stream: self.stream.clone(),
                    count: records,
                });
                debug!(table = %self.stream, path, records, "Extracted file");
                Ok(records)
            }
            Err(err) => {
                if !matches!(err, PipelineError::Cancelled) {
                    warn!(table = %self.stream, path, error = %err, "Failed to extract file");
                }
                emit!(FileExtracted {
                    stream: self.stream.clone(),
                    status: FileStatus::Failed,
                });
                Err(err)
            }
        }
    }

    async fn extract_once(&self, path: &str, records: &AtomicU64) -> Result<(), PipelineError> {
        let data = self
            .storage
            .get_with_retry(path, &self.read_retry)
            .await
            .context(FileReadSnafu { path })?;

        let decoder = Arc::clone(&self.decoder);
        let owned_path = path.to_string();
        let mut reader = tokio::task::spawn_blocking(move || decoder.open(data, &owned_path))
            .await
            .context(TaskJoinSnafu)??;

        let schema = translate(reader.columns())?;
        self.queue
            .put(Message::Schema {
                stream: self.stream.clone(),
                schema: schema.to_value(),
                key_properties: self.key_properties.clone(),
            })
            .await?;

        loop {
            let (returned, chunk) = next_chunk(reader, self.chunk_size).await?;
            reader = returned;
            let rows = chunk?;
            if rows.is_empty() {
                return Ok(());
            }

            for row in rows {
                ensure!(!self.shutdown.is_cancelled(), CancelledSnafu);
                self.queue
                    .put(Message::Record {
                        stream: self.stream.clone(),
                        record: self.selection.apply(row),
                        version: self.version,
                    })
                    .await?;
                records.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

type Chunk = (Box<dyn RowReader>, Result<Vec<Row>, ReaderError>);

/// Decode up to `size` rows on the blocking pool.
async fn next_chunk(mut reader: Box<dyn RowReader>, size: usize) -> Result<Chunk, PipelineError> {
    tokio::task::spawn_blocking(move || {
        let rows = reader
            .by_ref()
            .take(size.max(1))
            .collect::<Result<Vec<Row>, ReaderError>>();
        (reader, rows)
    })
    .await
    .context(TaskJoinSnafu)
}
