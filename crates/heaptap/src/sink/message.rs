//! Messages delivered to a sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checkpoint::Version;
use crate::transform::Row;

/// One typed output message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Record schema for the rows that follow on `stream`.
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    /// One row, written under `version`.
    Record {
        stream: String,
        record: Row,
        version: Version,
    },
    /// Downstream may discard rows of `stream` not written under `version`.
    ActivateVersion { stream: String, version: Version },
}

impl Message {
    pub fn stream(&self) -> &str {
        match self {
            Message::Schema { stream, .. }
            | Message::Record { stream, .. }
            | Message::ActivateVersion { stream, .. } => stream,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Message::Record { .. })
    }
}
