//! Object store construction for each supported backend.
//!
//! Credentials come from the environment first; `storage_options` from the
//! configuration override them key by key.

use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{
    AzureConfigSnafu, GcsConfigSnafu, IoSnafu, ObjectStoreSnafu, S3ConfigSnafu, StorageError,
};

use super::BackendConfig;

/// An S3 bucket, optionally behind a custom endpoint (MinIO, LocalStack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
}

/// A directory on the local filesystem. Created on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

/// HTTP-level retries inside object_store. Kept short because reads are
/// also retried at the request level with [`crate::RetryPolicy`].
fn transport_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        retry_timeout: Duration::from_secs(60),
        ..RetryConfig::default()
    }
}

fn with_key(root: String, key: Option<&Path>) -> String {
    match key {
        Some(key) => format!("{root}/{key}"),
        None => root,
    }
}

impl BackendConfig {
    /// URL of the storage root, e.g. `s3://bucket/prefix`.
    pub fn canonical_url(&self) -> String {
        match self {
            BackendConfig::S3(s3) => with_key(format!("s3://{}", s3.bucket), s3.key.as_ref()),
            BackendConfig::Gcs(gcs) => with_key(format!("gs://{}", gcs.bucket), gcs.key.as_ref()),
            BackendConfig::Azure(azure) => with_key(
                format!(
                    "abfss://{}@{}.dfs.core.windows.net",
                    azure.container, azure.account
                ),
                azure.key.as_ref(),
            ),
            BackendConfig::Local(local) => format!("file://{}", local.path),
        }
    }

    /// Build the object store for this backend.
    pub(super) async fn build(
        &self,
        options: &HashMap<String, String>,
    ) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let store: Arc<dyn ObjectStore> = match self {
            BackendConfig::S3(s3) => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&s3.bucket)
                    .with_retry(transport_retry());
                for (key, value) in options {
                    builder =
                        builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
                }
                if let Some(region) = &s3.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &s3.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_virtual_hosted_style_request(false)
                        .with_allow_http(true);
                }
                Arc::new(builder.build().context(S3ConfigSnafu)?)
            }
            BackendConfig::Gcs(gcs) => {
                let mut builder = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&gcs.bucket)
                    .with_retry(transport_retry());
                if let Ok(service_account_key) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
                    debug!("Using GCS service account key from environment");
                    builder = builder.with_service_account_key(&service_account_key);
                }
                for (key, value) in options {
                    builder =
                        builder.with_config(key.parse().context(GcsConfigSnafu)?, value.clone());
                }
                Arc::new(builder.build().context(GcsConfigSnafu)?)
            }
            BackendConfig::Azure(azure) => {
                let mut builder = MicrosoftAzureBuilder::from_env()
                    .with_account(&azure.account)
                    .with_container_name(&azure.container)
                    .with_retry(transport_retry());
                for (key, value) in options {
                    builder =
                        builder.with_config(key.parse().context(AzureConfigSnafu)?, value.clone());
                }
                Arc::new(builder.build().context(AzureConfigSnafu)?)
            }
            BackendConfig::Local(local) => {
                tokio::fs::create_dir_all(&local.path)
                    .await
                    .context(IoSnafu)?;
                Arc::new(LocalFileSystem::new_with_prefix(&local.path).context(ObjectStoreSnafu)?)
            }
        };
        Ok(store)
    }
}
