//! Column selection applied to decoded rows.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::catalog::{Inclusion, StreamMetadata};

/// A decoded row: column name to JSON value, in file column order.
pub type Row = Map<String, Value>;

/// Precomputed set of fields to drop for one stream.
///
/// Key properties and automatic fields are always kept. Otherwise a field is
/// dropped when it is deselected or unsupported. Fields the metadata does not
/// mention are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    dropped: BTreeSet<String>,
}

impl FieldSelection {
    /// `key_properties` are the stream's effective keys, see
    /// [`StreamMetadata::key_properties`].
    pub fn new(metadata: &StreamMetadata, key_properties: &[String]) -> Self {
        let dropped = metadata
            .fields
            .iter()
            .filter(|(name, field)| {
                let is_key = key_properties.iter().any(|key| key == *name);
                let automatic = field.inclusion == Some(Inclusion::Automatic);
                let excluded = field.selected == Some(false)
                    || field.inclusion == Some(Inclusion::Unsupported);
                !is_key && !automatic && excluded
            })
            .map(|(name, _)| name.clone())
            .collect();
        Self { dropped }
    }

    /// Remove dropped fields from `row`.
    pub fn apply(&self, mut row: Row) -> Row {
        if !self.dropped.is_empty() {
            row.retain(|name, _| !self.dropped.contains(name));
        }
        row
    }

    pub fn is_dropped(&self, field: &str) -> bool {
        self.dropped.contains(field)
    }
}

/// Filter one row of `table` against the stream's metadata.
pub fn filter(row: Row, table: &str, metadata: &StreamMetadata) -> Row {
    FieldSelection::new(metadata, &metadata.key_properties(table)).apply(row)
}
