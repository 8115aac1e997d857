//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for reading exports from S3, GCS, Azure Blob
//! Storage and the local filesystem, and for persisting small state files.
//! All paths handed to and returned from [`StorageProvider`] are relative to
//! the configured root URL.

mod backend;
mod url_parser;

pub use backend::{AzureConfig, GcsConfig, LocalConfig, S3Config};
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{Stream, StreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    ///
    /// Options are backend configuration keys understood by object_store
    /// (for example `aws_access_key_id` or `google_service_account`).
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;
        let object_store = config.build(&options).await?;
        let canonical_url = config.canonical_url();
        debug!(url = %canonical_url, "Opened storage");

        Ok(Self {
            config,
            object_store,
            canonical_url,
        })
    }

    /// Canonical URL of the storage root, e.g. `s3://bucket/prefix`.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key_prefix() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(&path)).await {
            Ok(response) => response.bytes().await,
            Err(err) => Err(err),
        };

        record_request(StorageOperation::Get, result.is_ok(), start);

        result.context(ObjectStoreSnafu)
    }

    /// Get the contents of a file, retrying transient failures.
    pub async fn get_with_retry(
        &self,
        path: &str,
        policy: &RetryPolicy,
    ) -> Result<Bytes, StorageError> {
        retry_with_backoff(policy, "storage_get", None, StorageError::is_retryable, || {
            self.get(path)
        })
        .await
    }

    /// List files under a prefix (relative to the configured root).
    ///
    /// Returns paths relative to the configured root. Pagination is handled
    /// by the underlying store's list stream.
    pub fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = Result<Path, StorageError>> + '_ {
        let prefix = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix).into_owned();

        let key_part_count = self
            .config
            .key_prefix()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        self.object_store
            .list(Some(&full_prefix))
            .map(move |meta| {
                meta.map(|meta| {
                    meta.location
                        .parts()
                        .skip(key_part_count)
                        .collect::<Path>()
                })
                .context(ObjectStoreSnafu)
            })
    }

    /// List every file under `prefix` whose name ends with `suffix`.
    ///
    /// Results are sorted for consistent ordering. A prefix that does not
    /// exist yields an empty list.
    pub async fn list_files(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();
        let mut total_listed = 0usize;

        let listed: Vec<Result<Path, StorageError>> = self
            .list_with_prefix(prefix)
            .filter(|entry| {
                ready(!matches!(entry, Err(err) if err.is_not_found()))
            })
            .collect()
            .await;

        let mut files = Vec::new();
        for entry in listed {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    record_request(StorageOperation::List, false, start);
                    return Err(err);
                }
            };
            total_listed += 1;
            if path.as_ref().ends_with(suffix) {
                files.push(path.to_string());
            }
        }
        record_request(StorageOperation::List, true, start);

        debug!(
            prefix,
            total_listed,
            matched = files.len(),
            "Listed files under prefix"
        );

        files.sort();
        Ok(files)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        record_request(StorageOperation::Put, result.is_ok(), start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Server-side rename (move). Local backends use a filesystem rename.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from = self.qualify_path(from);
        let to = self.qualify_path(to);
        let start = Instant::now();
        let result = self.object_store.rename(&from, &to).await;

        record_request(StorageOperation::Rename, result.is_ok(), start);

        result.context(ObjectStoreSnafu)
    }

    /// Atomically write content to a path using temp file + rename.
    ///
    /// The target is never observed partially written: content goes to
    /// `{path}.tmp` first and is then renamed over `{path}`. If either step
    /// fails the previous content (if any) is unchanged.
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_path = Path::from(format!("{path}.tmp"));
        self.put_payload(&temp_path, PutPayload::from(Bytes::from(content)))
            .await?;
        self.rename(&temp_path, path).await
    }
}

fn record_request(operation: StorageOperation, ok: bool, start: Instant) {
    let status = if ok {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}
