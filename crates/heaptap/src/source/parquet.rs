//! Parquet decoder.
//!
//! Files are decoded through the Arrow reader in record batches of
//! `batch_size` rows; each batch is then flattened into JSON rows keyed by
//! column name in schema order.

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float16Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
    Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use bytes::Bytes;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use super::traits::{FileDecoder, RowReader};
use crate::error::{BatchDecodeSnafu, ParquetOpenSnafu, ReaderError};
use crate::schema::{ColumnDescriptor, DeclaredType};
use crate::transform::Row;

/// Default number of rows decoded per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Decodes Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetDecoder {
    batch_size: usize,
}

impl Default for ParquetDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ParquetDecoder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl FileDecoder for ParquetDecoder {
    fn open(&self, data: Bytes, path: &str) -> Result<Box<dyn RowReader>, ReaderError> {
        let size = data.len();
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(data).context(ParquetOpenSnafu { path })?;
        let columns = builder
            .schema()
            .fields()
            .iter()
            .map(|field| column_descriptor(field))
            .collect();
        let rows = builder.metadata().file_metadata().num_rows();
        let batches = builder
            .with_batch_size(self.batch_size)
            .build()
            .context(ParquetOpenSnafu { path })?;

        debug!(path, size, rows, "Opened parquet file");

        Ok(Box::new(ParquetRowReader {
            path: path.to_string(),
            columns,
            batches,
            pending: Vec::new().into_iter(),
        }))
    }
}

/// Declared types for an Arrow field. Nullable fields add `null`.
pub fn column_descriptor(field: &Field) -> ColumnDescriptor {
    let mut types = Vec::with_capacity(2);
    if field.is_nullable() && *field.data_type() != DataType::Null {
        types.push(DeclaredType::Null);
    }
    types.push(declared_type(field.data_type()));
    ColumnDescriptor::new(field.name().clone(), types)
}

fn declared_type(data_type: &DataType) -> DeclaredType {
    match data_type {
        DataType::Null => DeclaredType::Null,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16 => DeclaredType::Int,
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 => DeclaredType::Long,
        DataType::Float16 | DataType::Float32 => DeclaredType::Float,
        DataType::Float64 => DeclaredType::Double,
        DataType::Boolean => DeclaredType::Boolean,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => DeclaredType::String,
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => DeclaredType::Bytes,
        DataType::FixedSizeBinary(_) => DeclaredType::Fixed,
        DataType::Dictionary(_, value)
            if matches!(
                value.as_ref(),
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ) =>
        {
            DeclaredType::Enum
        }
        other => DeclaredType::Other(other.to_string()),
    }
}

struct ParquetRowReader {
    path: String,
    columns: Vec<ColumnDescriptor>,
    batches: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<Row>,
}

impl Iterator for ParquetRowReader {
    type Item = Result<Row, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            let batch = match self.batches.next()? {
                Ok(batch) => batch,
                Err(source) => {
                    return Some(Err(source).context(BatchDecodeSnafu { path: &self.path }));
                }
            };
            match batch_rows(&batch, &self.path) {
                Ok(rows) => self.pending = rows.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl RowReader for ParquetRowReader {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }
}

fn batch_rows(batch: &RecordBatch, path: &str) -> Result<Vec<Row>, ReaderError> {
    let schema = batch.schema();
    let mut rows: Vec<Row> = (0..batch.num_rows())
        .map(|_| Row::with_capacity(batch.num_columns()))
        .collect();

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let values =
            column_values(array.as_ref()).map_err(|message| ReaderError::ColumnConvert {
                path: path.to_string(),
                column: field.name().clone(),
                message,
            })?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(field.name().clone(), value);
        }
    }

    Ok(rows)
}

fn values_of(array: &dyn Array, value: impl Fn(usize) -> Value) -> Vec<Value> {
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Value::Null
            } else {
                value(i)
            }
        })
        .collect()
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

/// JSON values of one column.
fn column_values(array: &dyn Array) -> Result<Vec<Value>, String> {
    Ok(match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Boolean => {
            let a = array.as_boolean();
            values_of(array, |i| Value::Bool(a.value(i)))
        }
        DataType::Int8 => {
            let a = array.as_primitive::<Int8Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Int16 => {
            let a = array.as_primitive::<Int16Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Int32 => {
            let a = array.as_primitive::<Int32Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Int64 => {
            let a = array.as_primitive::<Int64Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::UInt8 => {
            let a = array.as_primitive::<UInt8Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::UInt16 => {
            let a = array.as_primitive::<UInt16Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::UInt32 => {
            let a = array.as_primitive::<UInt32Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::UInt64 => {
            let a = array.as_primitive::<UInt64Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Float16 => {
            let a = array.as_primitive::<Float16Type>();
            values_of(array, |i| Value::from(a.value(i).to_f64()))
        }
        DataType::Float32 => {
            let a = array.as_primitive::<Float32Type>();
            values_of(array, |i| Value::from(f64::from(a.value(i))))
        }
        DataType::Float64 => {
            let a = array.as_primitive::<Float64Type>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Utf8 => {
            let a = array.as_string::<i32>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::LargeUtf8 => {
            let a = array.as_string::<i64>();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Utf8View => {
            let a = array.as_string_view();
            values_of(array, |i| Value::from(a.value(i)))
        }
        DataType::Binary => {
            let a = array.as_binary::<i32>();
            values_of(array, |i| bytes_value(a.value(i)))
        }
        DataType::LargeBinary => {
            let a = array.as_binary::<i64>();
            values_of(array, |i| bytes_value(a.value(i)))
        }
        DataType::BinaryView => {
            let a = array.as_binary_view();
            values_of(array, |i| bytes_value(a.value(i)))
        }
        DataType::FixedSizeBinary(_) => {
            let a = array.as_fixed_size_binary();
            values_of(array, |i| bytes_value(a.value(i)))
        }
        DataType::Dictionary(_, _) => {
            let decoded = cast(array, &DataType::Utf8).map_err(|e| e.to_string())?;
            return column_values(decoded.as_ref());
        }
        other => return Err(format!("no JSON conversion for {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        ArrayRef, BooleanArray, DictionaryArray, Float64Array, Int32Array, Int64Array,
        StringArray,
    };
    use arrow::datatypes::Schema;
    use parquet::arrow::ArrowWriter;
    use serde_json::json;
    use std::sync::Arc;

    fn write_parquet(batch: &RecordBatch) -> Bytes {
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
        Bytes::from(buffer)
    }

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("event_id", DataType::Int64, false),
            Field::new("count", DataType::Int32, true),
            Field::new("amount", DataType::Float64, true),
            Field::new("ok", DataType::Boolean, false),
            Field::new("path", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(Int32Array::from(vec![Some(10), None, Some(30)])),
            Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])),
            Arc::new(BooleanArray::from(vec![true, false, true])),
            Arc::new(StringArray::from(vec![Some("/a"), Some("/b"), None])),
        ];
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn test_decode_rows_in_order() {
        let data = write_parquet(&sample_batch());
        let reader = ParquetDecoder::new(2)
            .open(data, "sync_1/events/part-0.parquet")
            .unwrap();
        let rows: Vec<Row> = reader.collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            Value::Object(rows[1].clone()),
            json!({"event_id": 2, "count": null, "amount": 2.0, "ok": false, "path": "/b"})
        );
        let keys: Vec<_> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["event_id", "count", "amount", "ok", "path"]);
        assert_eq!(rows[2]["path"], Value::Null);
    }

    #[test]
    fn test_column_descriptors() {
        let data = write_parquet(&sample_batch());
        let reader = ParquetDecoder::default().open(data, "f.parquet").unwrap();
        let columns = reader.columns();

        assert_eq!(columns[0], ColumnDescriptor::new("event_id", [DeclaredType::Long]));
        assert_eq!(
            columns[1],
            ColumnDescriptor::new("count", [DeclaredType::Null, DeclaredType::Int])
        );
        assert_eq!(
            columns[2],
            ColumnDescriptor::new("amount", [DeclaredType::Null, DeclaredType::Double])
        );
        assert_eq!(columns[3], ColumnDescriptor::new("ok", [DeclaredType::Boolean]));
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(declared_type(&DataType::UInt32), DeclaredType::Long);
        assert_eq!(declared_type(&DataType::UInt16), DeclaredType::Int);
        assert_eq!(declared_type(&DataType::FixedSizeBinary(16)), DeclaredType::Fixed);
        assert_eq!(
            declared_type(&DataType::Dictionary(
                Box::new(DataType::Int32),
                Box::new(DataType::Utf8)
            )),
            DeclaredType::Enum
        );
        assert!(matches!(
            declared_type(&DataType::Date32),
            DeclaredType::Other(_)
        ));
    }

    #[test]
    fn test_dictionary_values_decode_as_strings() {
        let dictionary: DictionaryArray<Int32Type> =
            vec!["web", "ios", "web"].into_iter().collect();
        let values = column_values(&dictionary).unwrap();
        assert_eq!(values, vec![json!("web"), json!("ios"), json!("web")]);
    }

    #[test]
    fn test_invalid_file_fails_to_open() {
        let result = ParquetDecoder::default().open(Bytes::from_static(b"not parquet"), "bad");
        assert!(matches!(result, Err(ReaderError::ParquetOpen { .. })));
    }
}
