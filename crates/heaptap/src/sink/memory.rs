//! In-memory sink.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{Message, MessageSink};
use crate::error::SinkError;

/// Collects messages in memory. Clones share the same buffer, so a caller
/// can keep a handle while the pipeline owns the sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of every message written so far.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Messages written to `stream`.
    pub fn messages_for(&self, stream: &str) -> Vec<Message> {
        self.lock()
            .iter()
            .filter(|message| message.stream() == stream)
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.lock().iter().filter(|m| m.is_record()).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl MessageSink for MemorySink {
    fn write(&mut self, message: &Message) -> Result<(), SinkError> {
        self.lock().push(message.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
