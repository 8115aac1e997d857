//! Fixtures for integration tests: a local export directory with Parquet
//! files and manifests.

#![allow(dead_code)]

use apache_avro::types::{Record, Value as AvroValue};
use apache_avro::{Schema as AvroSchema, Writer};
use arrow::array::{ArrayRef, Date32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use tempfile::TempDir;

use heaptap::Tap;
use heaptap::catalog::Catalog;
use heaptap::config::ExtractionConfig;
use heaptap::sink::{Message, MessageSink};
use heaptap::error::SinkError;
use heaptap_core::{RetryPolicy, StorageProvider};

pub struct Export {
    pub dir: TempDir,
}

impl Export {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &str {
        self.dir.path().to_str().unwrap()
    }

    pub fn write_parquet(&self, relative: &str, batch: &RecordBatch) {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
    }

    /// Write an Avro part file with `event_id: long` and
    /// `path: ["null", "string"]`; even ids get a null path.
    pub fn write_avro(&self, relative: &str, ids: &[i64]) {
        let schema = AvroSchema::parse_str(
            r#"{"type": "record", "name": "event", "fields": [
                {"name": "event_id", "type": "long"},
                {"name": "path", "type": ["null", "string"]}
            ]}"#,
        )
        .unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        for id in ids {
            let mut record = Record::new(&schema).unwrap();
            record.put("event_id", *id);
            let path = if id % 2 == 0 {
                AvroValue::Union(0, Box::new(AvroValue::Null))
            } else {
                AvroValue::Union(1, Box::new(AvroValue::String(format!("/page/{id}"))))
            };
            record.put("path", path);
            writer.append(record).unwrap();
        }

        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, writer.into_inner().unwrap()).unwrap();
    }

    /// Write `manifests/sync_<dump_id>.json` with one entry per
    /// `(table, files, columns, incremental)`.
    pub fn write_manifest(&self, dump_id: u64, tables: &[(&str, &[&str], &[&str], bool)]) {
        let tables: Vec<Value> = tables
            .iter()
            .map(|(name, files, columns, incremental)| {
                json!({
                    "name": name,
                    "files": files,
                    "columns": columns,
                    "incremental": incremental,
                })
            })
            .collect();
        let path = self
            .dir
            .path()
            .join("manifests")
            .join(format!("sync_{dump_id}.json"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, json!({"dump_id": dump_id, "tables": tables}).to_string()).unwrap();
    }

    pub async fn tap(&self, extraction: ExtractionConfig) -> Tap {
        let storage = StorageProvider::for_url_with_options(self.root(), HashMap::new())
            .await
            .unwrap();
        Tap::new(Arc::new(storage), RetryPolicy::none(), extraction)
    }
}

/// Extraction settings with no file retries.
pub fn extraction(batch_width: usize) -> ExtractionConfig {
    ExtractionConfig {
        batch_width,
        file_retry: RetryPolicy::none(),
        ..Default::default()
    }
}

pub async fn selected_catalog(tap: &Tap) -> Catalog {
    tap.discover().await.unwrap().select_all()
}

fn events_schema(extra: Option<Field>) -> Arc<Schema> {
    let mut fields = vec![
        Field::new("event_id", DataType::Int64, false),
        Field::new("path", DataType::Utf8, true),
    ];
    fields.extend(extra);
    Arc::new(Schema::new(fields))
}

fn paths(ids: &[i64]) -> ArrayRef {
    Arc::new(StringArray::from(
        ids.iter()
            .map(|id| Some(format!("/page/{id}")))
            .collect::<Vec<_>>(),
    ))
}

/// Rows with `event_id` and `path` columns.
pub fn events(ids: &[i64]) -> RecordBatch {
    RecordBatch::try_new(
        events_schema(None),
        vec![Arc::new(Int64Array::from(ids.to_vec())), paths(ids)],
    )
    .unwrap()
}

/// Rows with an extra nullable `title` column.
pub fn events_with_title(ids: &[i64]) -> RecordBatch {
    let titles: Vec<Option<String>> = ids.iter().map(|id| Some(format!("Title {id}"))).collect();
    RecordBatch::try_new(
        events_schema(Some(Field::new("title", DataType::Utf8, true))),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            paths(ids),
            Arc::new(StringArray::from(titles)),
        ],
    )
    .unwrap()
}

/// Rows with `user_id` and `email` columns.
pub fn users(ids: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("email", DataType::Utf8, true),
    ]));
    let emails: Vec<Option<String>> = ids.iter().map(|id| Some(format!("u{id}@example.com"))).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(emails)),
        ],
    )
    .unwrap()
}

/// Rows with a date column, which has no JSON schema mapping.
pub fn events_with_date(ids: &[i64]) -> RecordBatch {
    RecordBatch::try_new(
        events_schema(Some(Field::new("day", DataType::Date32, true))),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            paths(ids),
            Arc::new(Date32Array::from(vec![19_000; ids.len()])),
        ],
    )
    .unwrap()
}

pub fn record_ids(messages: &[Message]) -> Vec<i64> {
    messages
        .iter()
        .filter_map(|message| match message {
            Message::Record { record, .. } => record.get("event_id").and_then(Value::as_i64),
            _ => None,
        })
        .collect()
}

pub fn activations(messages: &[Message]) -> Vec<i64> {
    messages
        .iter()
        .filter_map(|message| match message {
            Message::ActivateVersion { version, .. } => Some(*version),
            _ => None,
        })
        .collect()
}

/// A sink that takes `delay` for every write.
pub struct SlowSink {
    pub delay: std::time::Duration,
}

impl MessageSink for SlowSink {
    fn write(&mut self, _message: &Message) -> Result<(), SinkError> {
        std::thread::sleep(self.delay);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink whose output is gone.
pub struct BrokenSink;

impl MessageSink for BrokenSink {
    fn write(&mut self, _message: &Message) -> Result<(), SinkError> {
        Err(SinkError::SinkWrite {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"),
        })
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
