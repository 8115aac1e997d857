//! Avro decoder.
//!
//! Heap exports write one Avro object container file per part. Each field of
//! the top-level record becomes a column; a union field contributes one
//! declared type per branch. Rows are decoded one at a time as the pipeline
//! pulls them.

use apache_avro::schema::SchemaKind;
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema};
use bytes::Bytes;
use serde_json::Value;
use snafu::prelude::*;
use std::io::Cursor;
use tracing::debug;

use super::traits::{FileDecoder, RowReader};
use crate::error::{AvroDecodeSnafu, AvroOpenSnafu, NotARecordSnafu, ReaderError};
use crate::schema::{ColumnDescriptor, DeclaredType};
use crate::transform::Row;

/// Decodes Avro object container files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroDecoder;

impl FileDecoder for AvroDecoder {
    fn open(&self, data: Bytes, path: &str) -> Result<Box<dyn RowReader>, ReaderError> {
        let size = data.len();
        let reader = Reader::new(Cursor::new(data)).context(AvroOpenSnafu { path })?;
        let columns = record_columns(reader.writer_schema()).context(NotARecordSnafu { path })?;

        debug!(path, size, columns = columns.len(), "Opened avro file");

        Ok(Box::new(AvroRowReader {
            path: path.to_string(),
            columns,
            reader,
        }))
    }
}

/// Columns of a record schema, or `None` for any other top-level schema.
fn record_columns(schema: &Schema) -> Option<Vec<ColumnDescriptor>> {
    match schema {
        Schema::Record(record) => Some(
            record
                .fields
                .iter()
                .map(|field| ColumnDescriptor::new(field.name.clone(), declared_types(&field.schema)))
                .collect(),
        ),
        _ => None,
    }
}

fn declared_types(schema: &Schema) -> Vec<DeclaredType> {
    match schema {
        Schema::Union(union) => union.variants().iter().map(declared_type).collect(),
        other => vec![declared_type(other)],
    }
}

fn declared_type(schema: &Schema) -> DeclaredType {
    match schema {
        Schema::Null => DeclaredType::Null,
        Schema::Boolean => DeclaredType::Boolean,
        Schema::Int => DeclaredType::Int,
        Schema::Long => DeclaredType::Long,
        Schema::Float => DeclaredType::Float,
        Schema::Double => DeclaredType::Double,
        Schema::Bytes => DeclaredType::Bytes,
        Schema::String => DeclaredType::String,
        Schema::Enum(_) => DeclaredType::Enum,
        Schema::Fixed(_) => DeclaredType::Fixed,
        other => DeclaredType::Other(format!("{:?}", SchemaKind::from(other)).to_lowercase()),
    }
}

struct AvroRowReader {
    path: String,
    columns: Vec<ColumnDescriptor>,
    reader: Reader<'static, Cursor<Bytes>>,
}

impl Iterator for AvroRowReader {
    type Item = Result<Row, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = match self.reader.next()? {
            Ok(value) => value,
            Err(source) => return Some(Err(source).context(AvroDecodeSnafu { path: &self.path })),
        };
        Some(record_row(value, &self.path))
    }
}

impl RowReader for AvroRowReader {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }
}

fn record_row(value: AvroValue, path: &str) -> Result<Row, ReaderError> {
    let AvroValue::Record(fields) = value else {
        return NotARecordSnafu { path }.fail();
    };

    let mut row = Row::with_capacity(fields.len());
    for (column, value) in fields {
        match json_value(value) {
            Ok(value) => {
                row.insert(column, value);
            }
            Err(message) => {
                return Err(ReaderError::ColumnConvert {
                    path: path.to_string(),
                    column,
                    message,
                });
            }
        }
    }
    Ok(row)
}

fn json_value(value: AvroValue) -> Result<Value, String> {
    Ok(match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(b) => Value::Bool(b),
        AvroValue::Int(i) => Value::from(i),
        AvroValue::Long(l) => Value::from(l),
        AvroValue::Float(f) => Value::from(f64::from(f)),
        AvroValue::Double(d) => Value::from(d),
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        AvroValue::String(s) | AvroValue::Enum(_, s) => Value::String(s),
        AvroValue::Union(_, inner) => json_value(*inner)?,
        other => return Err(format!("unsupported avro value {other:?}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::schema::translate;
    use apache_avro::Writer;
    use apache_avro::types::Record;
    use serde_json::json;
    use std::collections::HashMap;

    const EVENTS_SCHEMA: &str = r#"{
        "type": "record",
        "name": "event",
        "fields": [
            {"name": "event_id", "type": "long"},
            {"name": "user_id", "type": ["null", "long"]},
            {"name": "kind", "type": {"type": "enum", "name": "kind", "symbols": ["view", "click"]}},
            {"name": "path", "type": ["null", "string"]}
        ]
    }"#;

    fn write_events() -> Bytes {
        let schema = Schema::parse_str(EVENTS_SCHEMA).unwrap();
        let mut writer = Writer::new(&schema, Vec::new());

        let mut first = Record::new(&schema).unwrap();
        first.put("event_id", 1i64);
        first.put("user_id", AvroValue::Union(1, Box::new(AvroValue::Long(7))));
        first.put("kind", AvroValue::Enum(1, "click".to_string()));
        first.put("path", AvroValue::Union(1, Box::new(AvroValue::String("/a".into()))));
        writer.append(first).unwrap();

        let mut second = Record::new(&schema).unwrap();
        second.put("event_id", 2i64);
        second.put("user_id", AvroValue::Union(0, Box::new(AvroValue::Null)));
        second.put("kind", AvroValue::Enum(0, "view".to_string()));
        second.put("path", AvroValue::Union(0, Box::new(AvroValue::Null)));
        writer.append(second).unwrap();

        Bytes::from(writer.into_inner().unwrap())
    }

    #[test]
    fn test_union_and_enum_columns() {
        let reader = AvroDecoder
            .open(write_events(), "sync_1/events/part-00000.avro")
            .unwrap();

        assert_eq!(
            reader.columns(),
            &[
                ColumnDescriptor::new("event_id", [DeclaredType::Long]),
                ColumnDescriptor::new("user_id", [DeclaredType::Null, DeclaredType::Long]),
                ColumnDescriptor::new("kind", [DeclaredType::Enum]),
                ColumnDescriptor::new("path", [DeclaredType::Null, DeclaredType::String]),
            ]
        );

        let schema = translate(reader.columns()).unwrap().to_value();
        assert_eq!(schema["properties"]["user_id"]["type"], json!(["null", "integer"]));
        assert_eq!(schema["properties"]["kind"]["type"], json!("string"));
    }

    #[test]
    fn test_rows_in_field_order() {
        let reader = AvroDecoder
            .open(write_events(), "sync_1/events/part-00000.avro")
            .unwrap();
        let rows: Vec<Row> = reader.collect::<Result<_, _>>().unwrap();

        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"event_id": 1, "user_id": 7, "kind": "click", "path": "/a"})
        );
        assert_eq!(
            Value::Object(rows[1].clone()),
            json!({"event_id": 2, "user_id": null, "kind": "view", "path": null})
        );
        let keys: Vec<_> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["event_id", "user_id", "kind", "path"]);
    }

    #[test]
    fn test_map_field_is_unsupported() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "event", "fields": [
                {"name": "event_id", "type": "long"},
                {"name": "properties", "type": {"type": "map", "values": "string"}}
            ]}"#,
        )
        .unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        let mut record = Record::new(&schema).unwrap();
        record.put("event_id", 1i64);
        record.put("properties", AvroValue::Map(HashMap::new()));
        writer.append(record).unwrap();
        let data = Bytes::from(writer.into_inner().unwrap());

        let reader = AvroDecoder.open(data, "part-00000.avro").unwrap();
        assert_eq!(
            reader.columns()[1].types,
            vec![DeclaredType::Other("map".to_string())]
        );
        assert!(matches!(
            translate(reader.columns()),
            Err(SchemaError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_garbage_is_an_open_error() {
        let err = AvroDecoder
            .open(Bytes::from_static(b"not avro"), "part-00000.avro")
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::AvroOpen { .. }));
    }
}
