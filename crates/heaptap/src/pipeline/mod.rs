//! Discovery and sync runs.
//!
//! A sync walks the selected streams one at a time. For each stream:
//!
//! - **Planning**: compute the file plan; mint and persist a version when the
//!   plan starts one.
//! - **Extracting**: files are processed in batches of `batch_width`, one
//!   worker per file. Workers push messages into one bounded queue drained by
//!   a single writer. After a batch, a barrier confirms the sink flushed
//!   everything before the file bookmark advances and is persisted.
//! - **Draining**: the queue is closed and the writer hands the sink back.
//! - **Complete**: the version is activated when this run delivered records
//!   under it and it was not activated before.
//!
//! Any worker failure cancels its siblings and fails the run with the first
//! error. The last persisted checkpoint stays valid.

mod queue;
mod worker;
mod writer;

use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use heaptap_core::metrics::events::{FilesPlanned, VersionActivated};
use heaptap_core::{RetryPolicy, StorageProvider, StorageProviderRef, emit};

use crate::catalog::{Catalog, CatalogEntry, discover};
use crate::checkpoint::{CheckpointManager, Version};
use crate::config::{Config, ExtractionConfig};
use crate::error::{CancelledSnafu, PipelineError, StorageSnafu, TaskJoinSnafu};
use crate::manifest::{MergedManifests, load_manifests};
use crate::planner::{SyncPlan, SyncPlanner};
use crate::sink::{Message, MessageSink};
use crate::source::{FileDecoder, FormatDecoder};
use crate::transform::FieldSelection;

use queue::DeliveryQueue;
use worker::WorkerContext;
use writer::WriterTask;

/// Stage of a stream sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Extracting,
    Draining,
    Complete,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Planning => "planning",
            Phase::Extracting => "extracting",
            Phase::Draining => "draining",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        })
    }
}

fn enter(table: &str, phase: Phase) {
    debug!(table, %phase, "Phase transition");
}

/// Outcome of syncing one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub stream: String,
    pub files_synced: usize,
    pub records_emitted: u64,
    pub batches_checkpointed: usize,
    /// Version the records were written under.
    pub version: Version,
    pub version_activated: bool,
}

/// The extractor: an export location plus extraction settings.
pub struct Tap {
    storage: StorageProviderRef,
    decoder: Arc<dyn FileDecoder>,
    planner: SyncPlanner,
    read_retry: RetryPolicy,
    extraction: ExtractionConfig,
}

impl Tap {
    pub fn new(
        storage: StorageProviderRef,
        read_retry: RetryPolicy,
        extraction: ExtractionConfig,
    ) -> Self {
        let planner = SyncPlanner::new(format!("{}/", storage.canonical_url()));
        Self {
            decoder: Arc::new(FormatDecoder::new(extraction.decode_batch_size)),
            storage,
            planner,
            read_retry,
            extraction,
        }
    }

    /// Connect to the export described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let storage = StorageProvider::for_url_with_options(
            &config.source.url,
            config.source.storage_options.clone(),
        )
        .await
        .context(StorageSnafu)?;

        Ok(Self::new(
            Arc::new(storage),
            config.source.read_retry,
            config.extraction.clone(),
        ))
    }

    /// Replace the file decoder.
    pub fn with_decoder(mut self, decoder: impl FileDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub async fn load_manifests(&self) -> Result<MergedManifests, PipelineError> {
        Ok(load_manifests(&self.storage, &self.read_retry).await?)
    }

    /// Build the catalog of every table in the export.
    pub async fn discover(&self) -> Result<Catalog, PipelineError> {
        let manifests = self.load_manifests().await?;
        let catalog = discover(&manifests)?;
        info!(streams = catalog.streams.len(), "Discovered streams");
        Ok(catalog)
    }

    /// Sync every selected stream of `catalog` into `sink`.
    pub async fn sync(
        &self,
        catalog: &Catalog,
        checkpoints: &mut CheckpointManager,
        sink: impl MessageSink + 'static,
        shutdown: &CancellationToken,
    ) -> Result<Vec<SyncStats>, PipelineError> {
        let manifests = self.load_manifests().await?;
        let mut sink: Box<dyn MessageSink> = Box::new(sink);
        let mut results = Vec::new();

        for entry in &catalog.streams {
            if !entry.metadata.is_selected() {
                info!(table = %entry.stream, "Skipping unselected stream");
                continue;
            }
            ensure!(!shutdown.is_cancelled(), CancelledSnafu);

            let (stats, returned) = self
                .sync_stream(&manifests, entry, checkpoints, sink, shutdown)
                .await?;
            sink = returned;
            results.push(stats);
        }

        Ok(results)
    }

    /// Sync one stream, handing the sink back on success.
    pub async fn sync_stream(
        &self,
        manifests: &MergedManifests,
        entry: &CatalogEntry,
        checkpoints: &mut CheckpointManager,
        sink: Box<dyn MessageSink>,
        shutdown: &CancellationToken,
    ) -> Result<(SyncStats, Box<dyn MessageSink>), PipelineError> {
        let table = entry.stream.as_str();
        info!(table, "Syncing table");

        enter(table, Phase::Planning);
        let plan = self
            .planner
            .plan(manifests, table, checkpoints.bookmark(table))?;
        emit!(FilesPlanned {
            stream: table.to_string(),
            count: plan.files.len() as u64,
        });

        let current = checkpoints.bookmark(table).and_then(|b| b.version);
        let version = match (plan.start_new_version, current) {
            (false, Some(version)) => version,
            _ => {
                let version = checkpoints.start_version(table, plan.min_dump_id);
                checkpoints.save(table).await?;
                info!(
                    table,
                    version,
                    dump_id = plan.min_dump_id,
                    "Starting new table version"
                );
                version
            }
        };

        let mut stats = SyncStats {
            stream: table.to_string(),
            version,
            ..Default::default()
        };

        let run = shutdown.child_token();
        let (queue, rx) = DeliveryQueue::channel(
            self.extraction.queue_capacity,
            self.extraction.queue_timeout(),
            run.clone(),
        );
        let writer = WriterTask::spawn(rx, sink, run.clone(), table.to_string());

        let key_properties = entry.key_properties();
        let context = Arc::new(WorkerContext {
            storage: Arc::clone(&self.storage),
            decoder: Arc::clone(&self.decoder),
            queue: queue.clone(),
            shutdown: run.clone(),
            stream: table.to_string(),
            selection: FieldSelection::new(&entry.metadata, &key_properties),
            key_properties,
            version,
            read_retry: self.read_retry,
            file_retry: self.extraction.file_retry,
            chunk_size: self.extraction.decode_batch_size,
        });

        enter(table, Phase::Extracting);
        let extracted = self
            .extract(&plan, context, &queue, checkpoints, &mut stats)
            .await;

        enter(table, Phase::Draining);
        drop(queue);
        if extracted.is_err() {
            run.cancel();
        }
        let written = writer.join().await;

        let mut sink = match (extracted, written) {
            (Ok(()), Ok(sink)) => sink,
            (extracted, written) => {
                enter(table, Phase::Failed);
                // A dead writer closes the queue under the workers, so its
                // error is the cause.
                let err = match (extracted, written) {
                    _ if shutdown.is_cancelled() => PipelineError::Cancelled,
                    (_, Err(err)) => err,
                    (Err(err), _) => err,
                    (Ok(()), Ok(_)) => PipelineError::QueueClosed,
                };
                warn!(
                    table,
                    files_synced = stats.files_synced,
                    batches_checkpointed = stats.batches_checkpointed,
                    error = %err,
                    "Sync failed"
                );
                return Err(err);
            }
        };

        enter(table, Phase::Complete);
        let needs_activation = checkpoints
            .bookmark(table)
            .is_none_or(|bookmark| bookmark.needs_activation(version));
        if stats.records_emitted > 0 && needs_activation {
            info!(table, version, "Activating version");
            sink.write(&Message::ActivateVersion {
                stream: table.to_string(),
                version,
            })?;
            sink.flush()?;
            checkpoints.state_mut().mark_activated(table, version);
            checkpoints.save(table).await?;
            emit!(VersionActivated {
                stream: table.to_string(),
            });
            stats.version_activated = true;
        }

        info!(
            table,
            files = stats.files_synced,
            records = stats.records_emitted,
            version,
            "Synced table"
        );
        Ok((stats, sink))
    }

    async fn extract(
        &self,
        plan: &SyncPlan,
        context: Arc<WorkerContext>,
        queue: &DeliveryQueue,
        checkpoints: &mut CheckpointManager,
        stats: &mut SyncStats,
    ) -> Result<(), PipelineError> {
        let table = context.stream.as_str();
        let width = self.extraction.batch_width.max(1);

        for batch in plan.files.chunks(width) {
            ensure!(!context.shutdown.is_cancelled(), CancelledSnafu);

            let mut workers = JoinSet::new();
            for path in batch {
                let context = Arc::clone(&context);
                let path = path.clone();
                workers.spawn(async move {
                    let result = context.extract_file(path.clone()).await;
                    (path, result)
                });
            }

            let mut failure: Option<PipelineError> = None;
            while let Some(joined) = workers.join_next().await {
                let outcome = match joined.context(TaskJoinSnafu) {
                    Ok((path, result)) => result.map_err(|source| PipelineError::WorkerFailed {
                        path,
                        source: Box::new(source),
                    }),
                    Err(err) => Err(err),
                };
                match outcome {
                    Ok(records) => {
                        stats.files_synced += 1;
                        stats.records_emitted += records;
                    }
                    Err(err) => {
                        // Siblings fail with `Cancelled` once the token fires;
                        // keep the error that started it.
                        context.shutdown.cancel();
                        if failure.is_none() {
                            failure = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = failure {
                return Err(err);
            }

            queue.barrier().await?;

            // `chunks` never yields an empty slice.
            if let Some(last) = batch.last() {
                checkpoints.state_mut().set_file(table, last);
                checkpoints.save(table).await?;
                stats.batches_checkpointed += 1;
                debug!(table, file = %last, "Advanced bookmark");
            }
        }

        Ok(())
    }
}
