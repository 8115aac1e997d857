//! Stream catalog: discovery output and sync input.
//!
//! A catalog lists one entry per table with its schema and selection
//! metadata. Discovery builds it from the merged manifests; a sync reads a
//! (possibly user-edited) catalog back and only extracts selected streams.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{
    CatalogError, CatalogParseSnafu, CatalogReadSnafu, CatalogWriteSnafu, ManifestError,
    NoStreamsFoundSnafu,
};
use crate::manifest::{MergedManifests, TableManifest};
use crate::schema::discovery_schema;

/// Key properties by table naming convention.
pub fn key_properties_for(table: &str) -> Vec<String> {
    let key = match table {
        "users" => "user_id",
        "user_migrations" => "from_user_id",
        _ => "event_id",
    };
    vec![key.to_string()]
}

/// How a field is included in extracted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    /// Always emitted.
    Automatic,
    /// Emitted unless deselected.
    Available,
    /// Never emitted.
    Unsupported,
}

/// How the downstream should replicate a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    Incremental,
    FullTable,
}

/// Stream-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub key_properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_replication_method: Option<ReplicationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

/// Field-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<Inclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

/// Selection metadata for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub table: TableMetadata,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMetadata>,
}

impl StreamMetadata {
    /// Metadata for a freshly discovered table.
    pub fn discovered<'a>(
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
        replication: ReplicationMethod,
    ) -> Self {
        let key_properties = key_properties_for(table);
        let fields = columns
            .into_iter()
            .map(|column| {
                let inclusion = if key_properties.iter().any(|key| key == column) {
                    Inclusion::Automatic
                } else {
                    Inclusion::Available
                };
                (
                    column.to_string(),
                    FieldMetadata {
                        inclusion: Some(inclusion),
                        selected: None,
                    },
                )
            })
            .collect();

        Self {
            table: TableMetadata {
                key_properties,
                forced_replication_method: Some(replication),
                selected: None,
            },
            fields,
        }
    }

    /// Only streams explicitly selected are synced.
    pub fn is_selected(&self) -> bool {
        self.table.selected == Some(true)
    }

    /// Key properties for `table`: the catalog's list, or the naming
    /// convention when an edited catalog left it empty.
    pub fn key_properties(&self, table: &str) -> Vec<String> {
        if self.table.key_properties.is_empty() {
            key_properties_for(table)
        } else {
            self.table.key_properties.clone()
        }
    }
}

/// One stream in a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub stream: String,
    pub tap_stream_id: String,
    pub schema: Value,
    #[serde(default)]
    pub metadata: StreamMetadata,
}

impl CatalogEntry {
    pub fn key_properties(&self) -> Vec<String> {
        self.metadata.key_properties(&self.stream)
    }
}

/// A full catalog document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    /// Read a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).context(CatalogReadSnafu { path: &display })?;
        serde_json::from_str(&contents).context(CatalogParseSnafu { path: display })
    }

    /// Pretty-printed JSON, as written by `discover`.
    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(self).context(CatalogWriteSnafu)
    }

    /// Entries whose metadata marks them selected.
    pub fn selected(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.streams.iter().filter(|entry| entry.metadata.is_selected())
    }

    /// Mark every stream selected. Handy for tests and ad-hoc runs.
    pub fn select_all(mut self) -> Self {
        for entry in &mut self.streams {
            entry.metadata.table.selected = Some(true);
        }
        self
    }
}

fn replication_method(table: &TableManifest) -> ReplicationMethod {
    if table.incremental_flags().contains(&true) {
        ReplicationMethod::Incremental
    } else {
        ReplicationMethod::FullTable
    }
}

/// Build the catalog for every table found in the manifests.
pub fn discover(manifests: &MergedManifests) -> Result<Catalog, ManifestError> {
    let streams: Vec<CatalogEntry> = manifests
        .tables()
        .map(|(name, table)| {
            let columns = table.columns();
            CatalogEntry {
                stream: name.to_string(),
                tap_stream_id: name.to_string(),
                schema: discovery_schema(columns.iter().copied()).to_value(),
                metadata: StreamMetadata::discovered(
                    name,
                    columns.iter().copied(),
                    replication_method(table),
                ),
            }
        })
        .collect();

    ensure!(!streams.is_empty(), NoStreamsFoundSnafu);

    Ok(Catalog { streams })
}
