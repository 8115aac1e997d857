//! Fetching manifest objects from storage.

use futures::{StreamExt, TryStreamExt, stream};
use snafu::prelude::*;
use tracing::{debug, info};

use heaptap_core::emit;
use heaptap_core::metrics::events::ManifestsLoaded;
use heaptap_core::{RetryPolicy, StorageProvider};

use crate::error::{
    ManifestError, ManifestListSnafu, ManifestParseSnafu, ManifestReadSnafu, NoManifestsFoundSnafu,
};

use super::{Manifest, MergedManifests};

/// Prefix under the export root where manifests live.
pub const MANIFEST_PREFIX: &str = "manifests";

/// Manifests are small; fetch a handful at a time.
const MANIFEST_FETCH_CONCURRENCY: usize = 8;

/// List, fetch and merge every manifest under [`MANIFEST_PREFIX`].
///
/// Fails with [`ManifestError::NoManifestsFound`] when the prefix holds no
/// `.json` objects.
pub async fn load_manifests(
    storage: &StorageProvider,
    retry: &RetryPolicy,
) -> Result<MergedManifests, ManifestError> {
    let paths = storage
        .list_files(MANIFEST_PREFIX, ".json")
        .await
        .context(ManifestListSnafu)?;

    if paths.is_empty() {
        return NoManifestsFoundSnafu {
            url: storage.canonical_url(),
        }
        .fail();
    }

    let manifests: Vec<Manifest> = stream::iter(paths.iter())
        .map(|path| async move {
            let bytes = storage
                .get_with_retry(path, retry)
                .await
                .context(ManifestReadSnafu { path })?;
            let manifest: Manifest =
                serde_json::from_slice(&bytes).context(ManifestParseSnafu { path })?;
            debug!(path = %path, dump_id = manifest.dump_id, "Loaded manifest");
            Ok::<_, ManifestError>(manifest)
        })
        .buffered(MANIFEST_FETCH_CONCURRENCY)
        .try_collect()
        .await?;

    let merged: MergedManifests = manifests.iter().collect();

    emit!(ManifestsLoaded {
        count: manifests.len() as u64,
    });
    info!(
        manifests = manifests.len(),
        tables = merged.len(),
        "Merged manifests"
    );

    Ok(merged)
}
