//! URL parsing for storage backends.
//!
//! Maps the URL forms accepted in `source.url` and `checkpoint.url` onto a
//! backend configuration. Patterns are tried in a fixed order so that an
//! ambiguous URL always resolves the same way.

use object_store::path::Path;
use regex::{Captures, Regex};
use snafu::prelude::*;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{AzureConfig, GcsConfig, LocalConfig, S3Config};

const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+?))?/?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+?))?/?$";
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+?))?/?$";

const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+?))?/?$";

const ABFS_URL: &str = r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+?))?/?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
}

static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_URL),
        (Backend::Gcs, GCS_URL),
        (Backend::Azure, ABFS_URL),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("Invalid regex pattern")))
    .collect()
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let Some((backend, captures)) = MATCHERS
            .iter()
            .find_map(|(backend, regex)| regex.captures(url).map(|caps| (*backend, caps)))
        else {
            return InvalidUrlSnafu { url }.fail();
        };

        let required = |name: &str| -> Result<String, StorageError> {
            captures
                .name(name)
                .map(|m| m.as_str().to_string())
                .context(InvalidUrlSnafu { url })
        };

        Ok(match backend {
            Backend::S3 => BackendConfig::S3(S3Config {
                endpoint: Self::s3_endpoint(&captures),
                region: std::env::var("AWS_DEFAULT_REGION")
                    .ok()
                    .or_else(|| captures.name("region").map(|m| m.as_str().to_string())),
                bucket: required("bucket")?,
                key: Self::key(&captures),
            }),
            Backend::Gcs => BackendConfig::Gcs(GcsConfig {
                bucket: required("bucket")?,
                key: Self::key(&captures),
            }),
            Backend::Azure => BackendConfig::Azure(AzureConfig {
                account: required("account")?,
                container: required("container")?,
                key: Self::key(&captures),
            }),
            Backend::Local => {
                let path = required("path")?;
                let path = if path.starts_with('/') {
                    path
                } else {
                    format!("/{path}")
                };
                BackendConfig::Local(LocalConfig {
                    path: path.trim_end_matches('/').to_string(),
                })
            }
        })
    }

    fn key(captures: &Captures<'_>) -> Option<Path> {
        captures.name("key").map(|m| Path::from(m.as_str()))
    }

    fn s3_endpoint(captures: &Captures<'_>) -> Option<String> {
        std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            captures.name("endpoint").map(|endpoint| {
                let port = captures
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = captures
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        })
    }

    /// Key prefix inside the bucket or container, if any.
    ///
    /// Local roots are opened with the full path as the filesystem prefix, so
    /// they never carry a key.
    pub(crate) fn key_prefix(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}
