//! Traits for message sinks.

use super::Message;
use crate::error::SinkError;

/// Accepts messages in delivery order.
///
/// A sink is owned by a single writer, so implementations need not be
/// thread-safe beyond `Send`.
pub trait MessageSink: Send {
    /// Deliver one message. May buffer.
    fn write(&mut self, message: &Message) -> Result<(), SinkError>;

    /// Push buffered messages out. After `flush` returns, every message
    /// written before it has been accepted.
    fn flush(&mut self) -> Result<(), SinkError>;
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn write(&mut self, message: &Message) -> Result<(), SinkError> {
        (**self).write(message)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}
