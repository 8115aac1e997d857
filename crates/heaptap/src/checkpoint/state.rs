//! Checkpoint state types.
//!
//! The persisted document looks like:
//!
//! ```json
//! {
//!   "bookmarks": {
//!     "events": {
//!       "file": "sync_102/events/part-00001.parquet",
//!       "version": 1718900000000,
//!       "activated_version": 1718900000000,
//!       "version_dump_id": 100
//!     }
//!   }
//! }
//! ```
//!
//! Unknown top-level keys are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::manifest::DumpId;

/// A table version stamp, in milliseconds since the Unix epoch.
pub type Version = i64;

/// Per-table sync position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Last fully delivered file, relative to the export root.
    #[serde(default)]
    pub file: Option<String>,
    /// Version that records are currently being written under.
    #[serde(default)]
    pub version: Option<Version>,
    /// Last version an activation message was delivered for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_version: Option<Version>,
    /// Batch the current version started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_dump_id: Option<DumpId>,
}

impl Bookmark {
    /// File and version to resume from. A file without a version (or the
    /// reverse) cannot be resumed and counts as no bookmark.
    pub fn resume_point(&self) -> Option<(&str, Version)> {
        match (&self.file, self.version) {
            (Some(file), Some(version)) => Some((file.as_str(), version)),
            _ => None,
        }
    }

    /// True when `version` has not had its activation delivered yet.
    pub fn needs_activation(&self, version: Version) -> bool {
        self.activated_version != Some(version)
    }
}

/// The whole state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub bookmarks: BTreeMap<String, Bookmark>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl CheckpointState {
    pub fn bookmark(&self, table: &str) -> Option<&Bookmark> {
        self.bookmarks.get(table)
    }

    fn bookmark_mut(&mut self, table: &str) -> &mut Bookmark {
        self.bookmarks.entry(table.to_string()).or_default()
    }

    /// Record that every file up to and including `file` was delivered.
    pub fn set_file(&mut self, table: &str, file: &str) {
        self.bookmark_mut(table).file = Some(file.to_string());
    }

    /// Start writing `table` under `version`, which replaces data from
    /// `dump_id` onwards. The file bookmark is cleared: nothing has been
    /// delivered under the new version yet.
    pub fn start_version(&mut self, table: &str, version: Version, dump_id: DumpId) {
        let bookmark = self.bookmark_mut(table);
        bookmark.file = None;
        bookmark.version = Some(version);
        bookmark.version_dump_id = Some(dump_id);
    }

    /// Record that `version` was activated downstream.
    pub fn mark_activated(&mut self, table: &str, version: Version) {
        self.bookmark_mut(table).activated_version = Some(version);
    }
}
