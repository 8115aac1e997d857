//! Manifest model and merging.
//!
//! Every export batch ("dump") writes one manifest object listing, per
//! table, the files it produced, the columns they contain and whether the
//! batch is incremental or a full replacement. [`MergedManifests`] folds any
//! number of them into one view keyed by table and then by dump id.
//!
//! Merging is a set union at every level, so it is idempotent, commutative
//! and associative: the order manifests are listed in never matters.

mod loader;

pub use loader::{MANIFEST_PREFIX, load_manifests};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of one export batch.
pub type DumpId = u64;

/// One manifest object, as written by the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub dump_id: DumpId,
    #[serde(default)]
    pub tables: Vec<ManifestTable>,
}

/// A table entry inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTable {
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Missing means the batch replaces the table.
    #[serde(default)]
    pub incremental: bool,
}

/// What one batch contributed to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchEntry {
    pub files: BTreeSet<String>,
    pub columns: BTreeSet<String>,
    /// Every incremental flag observed for this batch. Normally a single
    /// value; both values means the exporter disagreed with itself.
    pub incremental: BTreeSet<bool>,
}

impl BatchEntry {
    fn merge(&mut self, other: &BatchEntry) {
        self.files.extend(other.files.iter().cloned());
        self.columns.extend(other.columns.iter().cloned());
        self.incremental.extend(other.incremental.iter().copied());
    }

    /// True when any manifest marked this batch as a full replacement.
    pub fn is_full_replacement(&self) -> bool {
        self.incremental.contains(&false)
    }

    /// True when manifests disagree about whether the batch is incremental.
    pub fn has_conflicting_flags(&self) -> bool {
        self.incremental.len() > 1
    }
}

/// Merged view of one table across all batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableManifest {
    batches: BTreeMap<DumpId, BatchEntry>,
}

impl TableManifest {
    fn from_entry(dump_id: DumpId, table: &ManifestTable) -> Self {
        let entry = BatchEntry {
            files: table.files.iter().cloned().collect(),
            columns: table.columns.iter().cloned().collect(),
            incremental: BTreeSet::from([table.incremental]),
        };
        Self {
            batches: BTreeMap::from([(dump_id, entry)]),
        }
    }

    fn merge(&mut self, other: &TableManifest) {
        for (dump_id, entry) in &other.batches {
            self.batches.entry(*dump_id).or_default().merge(entry);
        }
    }

    /// Per-batch entries in ascending dump id order.
    pub fn batches(&self) -> &BTreeMap<DumpId, BatchEntry> {
        &self.batches
    }

    pub fn batch(&self, dump_id: DumpId) -> Option<&BatchEntry> {
        self.batches.get(&dump_id)
    }

    /// Contributing dump ids, ascending.
    pub fn dump_ids(&self) -> impl Iterator<Item = DumpId> + '_ {
        self.batches.keys().copied()
    }

    /// Union of files across all batches.
    pub fn files(&self) -> BTreeSet<&str> {
        self.batches
            .values()
            .flat_map(|entry| entry.files.iter().map(String::as_str))
            .collect()
    }

    /// Union of columns across all batches.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.batches
            .values()
            .flat_map(|entry| entry.columns.iter().map(String::as_str))
            .collect()
    }

    /// Every incremental flag observed for the table.
    pub fn incremental_flags(&self) -> BTreeSet<bool> {
        self.batches
            .values()
            .flat_map(|entry| entry.incremental.iter().copied())
            .collect()
    }

    /// Dump ids of batches that replace the table, ascending.
    pub fn full_replacement_dumps(&self) -> impl Iterator<Item = DumpId> + '_ {
        self.batches
            .iter()
            .filter(|(_, entry)| entry.is_full_replacement())
            .map(|(dump_id, _)| *dump_id)
    }
}

/// All manifests merged, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedManifests {
    tables: BTreeMap<String, TableManifest>,
}

impl MergedManifests {
    /// View of a single manifest.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut merged = Self::default();
        for table in &manifest.tables {
            merged
                .tables
                .entry(table.name.clone())
                .or_default()
                .merge(&TableManifest::from_entry(manifest.dump_id, table));
        }
        merged
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &MergedManifests) {
        for (name, table) in &other.tables {
            self.tables.entry(name.clone()).or_default().merge(table);
        }
    }

    /// Union of `self` and `other`.
    pub fn merged(mut self, other: &MergedManifests) -> Self {
        self.merge(other);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableManifest> {
        self.tables.get(name)
    }

    /// Tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableManifest)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<'a> FromIterator<&'a Manifest> for MergedManifests {
    fn from_iter<I: IntoIterator<Item = &'a Manifest>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |merged, manifest| {
            merged.merged(&MergedManifests::from_manifest(manifest))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn manifest(dump_id: DumpId, tables: &[(&str, &[&str], &[&str], bool)]) -> Manifest {
        Manifest {
            dump_id,
            tables: tables
                .iter()
                .map(|(name, files, columns, incremental)| ManifestTable {
                    name: name.to_string(),
                    files: files.iter().map(|f| f.to_string()).collect(),
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    incremental: *incremental,
                })
                .collect(),
        }
    }

    fn sample() -> Vec<MergedManifests> {
        vec![
            MergedManifests::from_manifest(&manifest(
                100,
                &[
                    ("events", &["sync_100/events/part-00000.parquet"], &["event_id", "time"], false),
                    ("users", &["sync_100/users/part-00000.parquet"], &["user_id"], false),
                ],
            )),
            MergedManifests::from_manifest(&manifest(
                101,
                &[("events", &["sync_101/events/part-00000.parquet"], &["event_id", "path"], true)],
            )),
            MergedManifests::from_manifest(&manifest(
                102,
                &[("sessions", &["sync_102/sessions/part-00003.parquet"], &["session_id"], true)],
            )),
        ]
    }

    #[test]
    fn test_merge_unions_files_columns_and_batches() {
        let merged = sample()
            .iter()
            .fold(MergedManifests::default(), |acc, m| acc.merged(m));

        assert_eq!(merged.len(), 3);
        let events = merged.table("events").unwrap();
        assert_eq!(events.dump_ids().collect::<Vec<_>>(), vec![100, 101]);
        assert_eq!(
            events.columns().into_iter().collect::<Vec<_>>(),
            vec!["event_id", "path", "time"]
        );
        assert_eq!(events.files().len(), 2);
        assert_eq!(events.incremental_flags(), BTreeSet::from([false, true]));
        assert_eq!(events.full_replacement_dumps().collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let [a, b, c]: [MergedManifests; 3] = sample().try_into().unwrap();

        let left = a.clone().merged(&b).merged(&c);
        let right = c.clone().merged(&a.clone().merged(&b));
        let shuffled = b.clone().merged(&c.clone().merged(&a));

        assert_eq!(left, right);
        assert_eq!(left, shuffled);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merged = sample()
            .iter()
            .fold(MergedManifests::default(), |acc, m| acc.merged(m));
        assert_eq!(merged.clone().merged(&merged), merged);
    }

    #[test]
    fn test_conflicting_flags_for_same_batch_are_kept() {
        let merged: MergedManifests = [
            manifest(7, &[("events", &["sync_7/events/part-00000.parquet"], &[], true)]),
            manifest(7, &[("events", &["sync_7/events/part-00001.parquet"], &[], false)]),
        ]
        .iter()
        .collect();

        let batch = merged.table("events").unwrap().batch(7).unwrap();
        assert!(batch.has_conflicting_flags());
        assert!(batch.is_full_replacement());
        assert_eq!(batch.files.len(), 2);
    }

    #[test]
    fn test_manifest_json_defaults_incremental_to_false() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"dump_id": 12, "tables": [{"name": "users", "files": ["sync_12/users/part-00000.parquet"], "columns": ["user_id"]}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.dump_id, 12);
        assert!(!manifest.tables[0].incremental);
    }
}
