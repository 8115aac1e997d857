//! Sync planning.
//!
//! Given the merged manifests and a table's bookmark, decide which files
//! still need to be delivered and whether they start a new table version.
//!
//! The window starts at the most recent of the bookmarked batch and the
//! latest full-replacement batch. Files from that batch onwards are ordered
//! by `(batch id, part number)` compared as integers, and everything up to
//! and including the bookmarked file is dropped.

use regex::Regex;
use snafu::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::checkpoint::Bookmark;
use crate::error::{InvalidFilePathSnafu, PlanError};
use crate::manifest::{DumpId, MergedManifests};

static DUMP_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sync_(\d+)$").expect("Invalid regex pattern"));

static PART_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid regex pattern"));

/// Position of a file in the global delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileKey {
    pub dump_id: DumpId,
    pub part: u64,
}

impl FileKey {
    /// Parse `sync_<dump>/<table>/<name>`, taking the part number from the
    /// first run of digits in `<name>`.
    pub fn parse(path: &str) -> Result<Self, PlanError> {
        let dump_id = Self::parse_dump_id(path)?;
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let part = PART_NUMBER
            .find(file_name)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .context(InvalidFilePathSnafu { path })?;
        Ok(Self { dump_id, part })
    }

    /// Batch id from the leading `sync_<dump>` segment.
    pub fn parse_dump_id(path: &str) -> Result<DumpId, PlanError> {
        let first = path.split('/').next().unwrap_or_default();
        DUMP_SEGMENT
            .captures(first)
            .and_then(|caps| caps[1].parse::<DumpId>().ok())
            .context(InvalidFilePathSnafu { path })
    }
}

/// Total order used for delivery: numeric key first, then the path itself.
fn delivery_order(a: &(FileKey, String), b: &(FileKey, String)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

/// Outcome of planning one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Files to extract, in delivery order.
    pub files: Vec<String>,
    /// Whether a fresh version must be minted before extraction.
    pub start_new_version: bool,
    /// First batch included in the window.
    pub min_dump_id: DumpId,
}

/// Computes [`SyncPlan`]s.
#[derive(Debug, Clone, Default)]
pub struct SyncPlanner {
    path_prefix: Option<String>,
}

impl SyncPlanner {
    /// `path_prefix` is stripped from manifest file entries (for example
    /// `s3://bucket/`) so that planned paths are relative to the export root.
    pub fn new(path_prefix: impl Into<String>) -> Self {
        let path_prefix = path_prefix.into();
        Self {
            path_prefix: (!path_prefix.is_empty()).then_some(path_prefix),
        }
    }

    fn relative<'a>(&self, file: &'a str) -> &'a str {
        match &self.path_prefix {
            Some(prefix) => file.strip_prefix(prefix.as_str()).unwrap_or(file),
            None => file,
        }
    }

    /// Plan the sync of `table`.
    pub fn plan(
        &self,
        manifests: &MergedManifests,
        table: &str,
        bookmark: Option<&Bookmark>,
    ) -> Result<SyncPlan, PlanError> {
        let resume = bookmark.and_then(Bookmark::resume_point);
        let bookmarked_dump = resume
            .map(|(file, _)| FileKey::parse_dump_id(file))
            .transpose()?;

        let Some(table_manifest) = manifests.table(table) else {
            return Ok(SyncPlan {
                files: Vec::new(),
                start_new_version: bookmarked_dump.is_none(),
                min_dump_id: bookmarked_dump.unwrap_or(0),
            });
        };

        let latest_full = table_manifest.full_replacement_dumps().max();
        let min_dump_id = match bookmarked_dump {
            Some(bookmarked) => bookmarked.max(latest_full.unwrap_or(0)),
            None => latest_full.unwrap_or(0),
        };
        let mut start_new_version = bookmarked_dump != Some(min_dump_id);

        // A batch that is both incremental and a replacement is treated as a
        // replacement, unless the current version was already started for it.
        let conflicted = table_manifest
            .batch(min_dump_id)
            .is_some_and(|batch| batch.has_conflicting_flags());
        let version_covers_window =
            bookmark.and_then(|b| b.version_dump_id) == Some(min_dump_id);
        if conflicted && !start_new_version && !version_covers_window {
            warn!(
                table,
                dump_id = min_dump_id,
                "Conflicting incremental flags, resyncing window under a new version"
            );
            start_new_version = true;
        }

        let candidates: BTreeSet<&str> = table_manifest
            .batches()
            .range(min_dump_id..)
            .flat_map(|(_, batch)| batch.files.iter())
            .map(|file| self.relative(file))
            .collect();

        let mut ordered = candidates
            .into_iter()
            .map(|path| Ok((FileKey::parse(path)?, path.to_string())))
            .collect::<Result<Vec<_>, PlanError>>()?;
        ordered.sort_by(delivery_order);
        let mut files: Vec<String> = ordered.into_iter().map(|(_, path)| path).collect();

        if !start_new_version {
            let position = resume
                .and_then(|(bookmarked_file, _)| files.iter().position(|f| f == bookmarked_file));
            if let Some(position) = position {
                files.drain(..=position);
            }
        }

        debug!(
            table,
            min_dump_id,
            start_new_version,
            files = files.len(),
            "Planned sync"
        );

        Ok(SyncPlan {
            files,
            start_new_version,
            min_dump_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::manifest;

    fn bookmark(file: &str, version: i64) -> Bookmark {
        Bookmark {
            file: Some(file.to_string()),
            version: Some(version),
            ..Default::default()
        }
    }

    /// Batch 100 replaces `events`, 101 and 102 append to it.
    fn replacement_then_increments() -> MergedManifests {
        [
            manifest(
                100,
                &[(
                    "events",
                    &["s3://bucket/sync_100/events/part-00001.parquet", "s3://bucket/sync_100/events/part-00000.parquet"],
                    &["event_id"],
                    false,
                )],
            ),
            manifest(
                101,
                &[("events", &["s3://bucket/sync_101/events/part-00000.parquet"], &["event_id"], true)],
            ),
            manifest(
                102,
                &[("events", &["s3://bucket/sync_102/events/part-00000.parquet"], &["event_id"], true)],
            ),
            manifest(
                99,
                &[("events", &["s3://bucket/sync_99/events/part-00000.parquet"], &["event_id"], true)],
            ),
        ]
        .iter()
        .collect()
    }

    #[test]
    fn test_file_key_parsing() {
        let key = FileKey::parse(
            "sync_852/sessions/part-00010-4a06bab5-0ef3-4b21-b9af-e772fbb37b0e-c000.avro",
        )
        .unwrap();
        assert_eq!(key, FileKey { dump_id: 852, part: 10 });

        assert!(FileKey::parse("dump_1/sessions/part-00000.parquet").is_err());
        assert!(FileKey::parse("sync_1/sessions/part.parquet").is_err());
        assert!(FileKey::parse_dump_id("sync_x/sessions/part-1.parquet").is_err());
    }

    #[test]
    fn test_no_bookmark_starts_at_latest_replacement() {
        let planner = SyncPlanner::new("s3://bucket/");
        let plan = planner
            .plan(&replacement_then_increments(), "events", None)
            .unwrap();

        assert!(plan.start_new_version);
        assert_eq!(plan.min_dump_id, 100);
        assert_eq!(
            plan.files,
            vec![
                "sync_100/events/part-00000.parquet",
                "sync_100/events/part-00001.parquet",
                "sync_101/events/part-00000.parquet",
                "sync_102/events/part-00000.parquet",
            ]
        );
    }

    #[test]
    fn test_bookmark_inside_window_resumes_after_it() {
        let planner = SyncPlanner::new("s3://bucket/");
        let bookmark = bookmark("sync_101/events/part-00000.parquet", 5);
        let plan = planner
            .plan(&replacement_then_increments(), "events", Some(&bookmark))
            .unwrap();

        assert!(!plan.start_new_version);
        assert_eq!(plan.min_dump_id, 101);
        assert_eq!(plan.files, vec!["sync_102/events/part-00000.parquet"]);
    }

    #[test]
    fn test_bookmark_before_replacement_starts_new_version() {
        let planner = SyncPlanner::new("s3://bucket/");
        let bookmark = bookmark("sync_99/events/part-00000.parquet", 5);
        let plan = planner
            .plan(&replacement_then_increments(), "events", Some(&bookmark))
            .unwrap();

        assert!(plan.start_new_version);
        assert_eq!(plan.min_dump_id, 100);
        assert_eq!(plan.files.len(), 4);
    }

    #[test]
    fn test_bookmark_without_version_is_ignored() {
        let planner = SyncPlanner::new("s3://bucket/");
        let bookmark = Bookmark {
            file: Some("sync_101/events/part-00000.parquet".to_string()),
            ..Default::default()
        };
        let plan = planner
            .plan(&replacement_then_increments(), "events", Some(&bookmark))
            .unwrap();

        assert!(plan.start_new_version);
        assert_eq!(plan.files.len(), 4);
    }

    #[test]
    fn test_numeric_ordering_not_lexicographic() {
        let manifests: MergedManifests = [
            manifest(
                10,
                &[("events", &["sync_10/events/part-00001.parquet"], &[], true)],
            ),
            manifest(
                2,
                &[(
                    "events",
                    &["sync_2/events/part-10.parquet", "sync_2/events/part-2.parquet"],
                    &[],
                    true,
                )],
            ),
        ]
        .iter()
        .collect();

        let plan = SyncPlanner::default().plan(&manifests, "events", None).unwrap();
        assert_eq!(plan.min_dump_id, 0);
        assert_eq!(
            plan.files,
            vec![
                "sync_2/events/part-2.parquet",
                "sync_2/events/part-10.parquet",
                "sync_10/events/part-00001.parquet",
            ]
        );
    }

    #[test]
    fn test_fully_synced_table_plans_nothing() {
        let planner = SyncPlanner::new("s3://bucket/");
        let bookmark = bookmark("sync_102/events/part-00000.parquet", 5);
        let plan = planner
            .plan(&replacement_then_increments(), "events", Some(&bookmark))
            .unwrap();

        assert!(!plan.start_new_version);
        assert!(plan.files.is_empty());
    }

    #[test]
    fn test_bookmark_missing_from_window_keeps_all_files() {
        let planner = SyncPlanner::new("s3://bucket/");
        let bookmark = bookmark("sync_101/events/part-00009.parquet", 5);
        let plan = planner
            .plan(&replacement_then_increments(), "events", Some(&bookmark))
            .unwrap();

        assert!(!plan.start_new_version);
        assert_eq!(
            plan.files,
            vec![
                "sync_101/events/part-00000.parquet",
                "sync_102/events/part-00000.parquet",
            ]
        );
    }

    #[test]
    fn test_conflicting_flags_force_new_version_once() {
        let manifests: MergedManifests = [
            manifest(5, &[("users", &["sync_5/users/part-00000.parquet"], &[], true)]),
            manifest(5, &[("users", &["sync_5/users/part-00001.parquet"], &[], false)]),
        ]
        .iter()
        .collect();
        let planner = SyncPlanner::default();

        let mut resumed = bookmark("sync_5/users/part-00000.parquet", 5);
        let plan = planner.plan(&manifests, "users", Some(&resumed)).unwrap();
        assert!(plan.start_new_version);
        assert_eq!(plan.files.len(), 2, "new version resends the whole window");

        resumed.version_dump_id = Some(5);
        let plan = planner.plan(&manifests, "users", Some(&resumed)).unwrap();
        assert!(!plan.start_new_version);
        assert_eq!(plan.files, vec!["sync_5/users/part-00001.parquet"]);
    }

    #[test]
    fn test_unknown_table_plans_nothing() {
        let plan = SyncPlanner::default()
            .plan(&replacement_then_increments(), "sessions", None)
            .unwrap();
        assert!(plan.files.is_empty());
        assert!(plan.start_new_version);
    }

    #[test]
    fn test_invalid_path_is_an_error() {
        let manifests: MergedManifests =
            [manifest(1, &[("events", &["exports/events/part-0.parquet"], &[], false)])]
                .iter()
                .collect();
        let err = SyncPlanner::default()
            .plan(&manifests, "events", None)
            .unwrap_err();
        assert!(err.to_string().contains("exports/events/part-0.parquet"));
    }
}
