//! JSON-lines sink.

use snafu::prelude::*;
use std::io::{BufWriter, Stdout, Write};

use super::{Message, MessageSink};
use crate::error::{SinkError, SinkSerializeSnafu, SinkWriteSnafu};

/// Writes one JSON document per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: BufWriter<W>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context(SinkWriteSnafu)
    }
}

impl<W: Write + Send> MessageSink for JsonLinesSink<W> {
    fn write(&mut self, message: &Message) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, message).context(SinkSerializeSnafu)?;
        self.writer.write_all(b"\n").context(SinkWriteSnafu)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().context(SinkWriteSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_message_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write(&Message::ActivateVersion {
            stream: "events".to_string(),
            version: 1,
        })
        .unwrap();
        sink.write(&Message::ActivateVersion {
            stream: "users".to_string(),
            version: 2,
        })
        .unwrap();
        sink.flush().unwrap();

        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"type":"ACTIVATE_VERSION","stream":"events","version":1}"#
        );
    }
}
