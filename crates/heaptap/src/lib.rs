//! heaptap: incremental extractor for manifest-described Avro and Parquet exports.
//!
//! This crate handles:
//! - Merging per-batch manifests into a per-table view of the export
//! - Discovering streams and reading selection back from a catalog
//! - Planning which files are new since the last checkpoint, and when a
//!   full replacement starts a new table version
//! - Extracting files in parallel into one ordered message stream
//! - Checkpointing progress after every batch of files

pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod planner;
pub mod schema;
pub mod sink;
pub mod source;
pub mod transform;

use std::sync::Arc;

use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::{CheckpointManager, StorageCheckpointStore};
use crate::error::StorageSnafu;
use crate::sink::JsonLinesSink;

// Re-export commonly used items
pub use catalog::Catalog;
pub use cli::{CliArgs, Command};
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{SyncStats, Tap};

pub use heaptap_core::{StorageProvider, StorageProviderRef, init_tracing, shutdown_token};

/// Open the checkpoint location described by `config`.
pub async fn checkpoint_manager(config: &Config) -> Result<CheckpointManager, PipelineError> {
    let storage = StorageProvider::for_url_with_options(
        &config.checkpoint.url,
        config.checkpoint.storage_options.clone(),
    )
    .await
    .context(StorageSnafu)?;

    let mut manager = CheckpointManager::new(StorageCheckpointStore::new(
        Arc::new(storage),
        config.checkpoint.file_name.clone(),
    ));
    manager.load().await?;
    Ok(manager)
}

/// Run one CLI command. Messages and catalogs go to stdout.
pub async fn run_command(
    command: &Command,
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<(), PipelineError> {
    let tap = Tap::from_config(config).await?;

    match command {
        Command::Discover => {
            let catalog = tap.discover().await?;
            println!("{}", catalog.to_json_pretty()?);
        }
        Command::Sync { catalog } => {
            let catalog = Catalog::from_path(catalog)?;
            let mut checkpoints = checkpoint_manager(config).await?;
            let stats = tap
                .sync(&catalog, &mut checkpoints, JsonLinesSink::stdout(), shutdown)
                .await?;

            let records: u64 = stats.iter().map(|s| s.records_emitted).sum();
            info!(streams = stats.len(), records, "Sync complete");
        }
    }

    Ok(())
}
