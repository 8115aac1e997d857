//! Checkpoint persistence.
//!
//! The whole state document is stored as one JSON object. Storage-backed
//! stores write it with the temp file + rename pattern so a reader never
//! observes a partially written state:
//!
//! 1. Write to `{file_name}.tmp`
//! 2. Rename over `{file_name}`

pub mod state;

pub use state::{Bookmark, CheckpointState, Version};

use async_trait::async_trait;
use chrono::Utc;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use heaptap_core::emit;
use heaptap_core::metrics::events::CheckpointSaved;
use heaptap_core::storage::StorageProvider;

use crate::error::{
    CheckpointError, CheckpointParseSnafu, CheckpointSerializeSnafu, CheckpointStorageSnafu,
};
use crate::manifest::DumpId;

/// Default name of the state object.
pub const DEFAULT_STATE_FILE: &str = "state.json";

/// Somewhere a [`CheckpointState`] can be loaded from and saved to.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the stored state, or `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<CheckpointState>, CheckpointError>;

    /// Replace the stored state.
    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError>;
}

/// Stores the state as a JSON object in a storage location.
pub struct StorageCheckpointStore {
    storage: Arc<StorageProvider>,
    file_name: String,
}

impl StorageCheckpointStore {
    pub fn new(storage: Arc<StorageProvider>, file_name: impl Into<String>) -> Self {
        Self {
            storage,
            file_name: file_name.into(),
        }
    }

    fn state_path(&self) -> Path {
        Path::from(self.file_name.as_str())
    }
}

#[async_trait]
impl CheckpointStore for StorageCheckpointStore {
    async fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let path = self.state_path();
        match self.storage.get(path.clone()).await {
            Ok(bytes) => {
                let state = serde_json::from_slice::<CheckpointState>(&bytes).context(
                    CheckpointParseSnafu {
                        path: path.to_string(),
                    },
                )?;
                Ok(Some(state))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).context(CheckpointStorageSnafu),
        }
    }

    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state).context(CheckpointSerializeSnafu)?;
        self.storage
            .atomic_write(&self.state_path(), json)
            .await
            .context(CheckpointStorageSnafu)
    }
}

/// In-process store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    slot: Arc<Mutex<Option<CheckpointState>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CheckpointState) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(state))),
        }
    }

    /// Last saved state.
    pub fn snapshot(&self) -> Option<CheckpointState> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state.clone());
        Ok(())
    }
}

/// Mints version stamps: wall-clock milliseconds, strictly increasing
/// within a process and strictly above any floor it is given.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: Option<Version>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next version, greater than the previous one and than `floor`.
    pub fn mint(&mut self, floor: Option<Version>) -> Version {
        let now = Utc::now().timestamp_millis();
        let version = [self.last, floor]
            .into_iter()
            .flatten()
            .map(|v| v.saturating_add(1))
            .fold(now, Version::max);
        self.last = Some(version);
        version
    }
}

/// Owns the in-memory state for a run and persists it through a store.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    state: CheckpointState,
    clock: VersionClock,
}

impl CheckpointManager {
    pub fn new(store: impl CheckpointStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            state: CheckpointState::default(),
            clock: VersionClock::new(),
        }
    }

    /// Start from `state` instead of loading.
    pub fn with_state(mut self, state: CheckpointState) -> Self {
        self.state = state;
        self
    }

    /// Load state from the store.
    ///
    /// Returns `Ok(true)` if a state was loaded, `Ok(false)` if none exists.
    pub async fn load(&mut self) -> Result<bool, CheckpointError> {
        match self.store.load().await? {
            Some(state) => {
                info!(bookmarks = state.bookmarks.len(), "Loaded checkpoint");
                self.state = state;
                Ok(true)
            }
            None => {
                debug!("No checkpoint found, starting fresh");
                Ok(false)
            }
        }
    }

    /// Persist the current state after a change to `stream`.
    pub async fn save(&self, stream: &str) -> Result<(), CheckpointError> {
        self.store.save(&self.state).await?;

        emit!(CheckpointSaved {
            stream: stream.to_string(),
        });
        debug!(
            table = stream,
            bookmark = ?self.state.bookmark(stream),
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Mint a version for `table` and record it as current, starting at
    /// `dump_id`. Does not persist.
    pub fn start_version(&mut self, table: &str, dump_id: DumpId) -> Version {
        let floor = self.state.bookmark(table).and_then(|b| b.version);
        let version = self.clock.mint(floor);
        self.state.start_version(table, version, dump_id);
        version
    }

    pub fn bookmark(&self, table: &str) -> Option<&Bookmark> {
        self.state.bookmark(table)
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CheckpointState {
        &mut self.state
    }
}
