//! Message sinks.
//!
//! The pipeline hands every message to exactly one sink, from one writer,
//! in delivery order.

mod memory;
mod message;
mod stdout;
mod traits;

pub use memory::MemorySink;
pub use message::Message;
pub use stdout::JsonLinesSink;
pub use traits::MessageSink;
