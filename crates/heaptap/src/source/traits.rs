//! Traits for data file decoders.
//!
//! Provides extensibility for different file formats through the
//! `FileDecoder` trait. The pipeline only sees column descriptors and rows.

use bytes::Bytes;

use crate::error::ReaderError;
use crate::schema::ColumnDescriptor;
use crate::transform::Row;

/// Opens a file's bytes as a row iterator.
pub trait FileDecoder: Send + Sync {
    /// # Arguments
    /// * `data` - The raw file contents
    /// * `path` - File path (used for error messages and logging)
    fn open(&self, data: Bytes, path: &str) -> Result<Box<dyn RowReader>, ReaderError>;
}

/// Rows of one open file, in file order.
pub trait RowReader: Iterator<Item = Result<Row, ReaderError>> + Send {
    /// Column descriptors embedded in the file.
    fn columns(&self) -> &[ColumnDescriptor];
}
