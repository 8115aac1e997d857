//! Data file decoding.
//!
//! Decoders turn a file's bytes into column descriptors plus a stream of
//! rows. Exports ship Avro part files; Parquet exports are read as well.
//! [`FormatDecoder`] picks one by file extension.

mod avro;
mod parquet;
mod traits;

pub use avro::AvroDecoder;
pub use parquet::{DEFAULT_BATCH_SIZE, ParquetDecoder, column_descriptor};
pub use traits::{FileDecoder, RowReader};

use bytes::Bytes;

use crate::error::{ReaderError, UnknownFormatSnafu};

/// Dispatches on the `.avro` / `.parquet` extension.
#[derive(Debug, Clone, Default)]
pub struct FormatDecoder {
    avro: AvroDecoder,
    parquet: ParquetDecoder,
}

impl FormatDecoder {
    /// `batch_size` applies to Parquet record batches.
    pub fn new(batch_size: usize) -> Self {
        Self {
            avro: AvroDecoder,
            parquet: ParquetDecoder::new(batch_size),
        }
    }
}

impl FileDecoder for FormatDecoder {
    fn open(&self, data: Bytes, path: &str) -> Result<Box<dyn RowReader>, ReaderError> {
        let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("avro") => self.avro.open(data, path),
            Some("parquet") => self.parquet.open(data, path),
            _ => UnknownFormatSnafu { path }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = FormatDecoder::default()
            .open(Bytes::from_static(b"a,b"), "sync_1/events/part-00000.csv")
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::UnknownFormat { .. }));
    }

    #[test]
    fn test_dispatch_by_extension() {
        let decoder = FormatDecoder::default();
        let avro = decoder
            .open(Bytes::from_static(b"junk"), "sync_1/events/part-00000.AVRO")
            .err()
            .unwrap();
        assert!(matches!(avro, ReaderError::AvroOpen { .. }));

        let parquet = decoder
            .open(Bytes::from_static(b"junk"), "sync_1/events/part-00000.parquet")
            .err()
            .unwrap();
        assert!(matches!(parquet, ReaderError::ParquetOpen { .. }));
    }
}
