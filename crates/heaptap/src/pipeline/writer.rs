//! The single writer that drains the delivery queue into the sink.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::queue::Envelope;
use crate::error::PipelineError;
use crate::sink::MessageSink;

/// Handle to the writer task.
pub(in crate::pipeline) struct WriterTask {
    handle: JoinHandle<Result<Box<dyn MessageSink>, PipelineError>>,
}

impl WriterTask {
    /// Spawn the writer. Sink calls are synchronous, so the writer runs on
    /// the blocking pool.
    pub fn spawn(
        rx: mpsc::Receiver<Envelope>,
        sink: Box<dyn MessageSink>,
        shutdown: CancellationToken,
        stream: String,
    ) -> Self {
        let handle = tokio::task::spawn_blocking(move || Self::run(rx, sink, shutdown, stream));
        Self { handle }
    }

    /// Wait for the writer to drain and hand the sink back.
    ///
    /// The writer stops when every producer handle is dropped, or right
    /// after the message in flight when `shutdown` fires.
    pub async fn join(self) -> Result<Box<dyn MessageSink>, PipelineError> {
        self.handle
            .await
            .map_err(|source| PipelineError::TaskJoin { source })?
    }

    fn run(
        mut rx: mpsc::Receiver<Envelope>,
        mut sink: Box<dyn MessageSink>,
        shutdown: CancellationToken,
        stream: String,
    ) -> Result<Box<dyn MessageSink>, PipelineError> {
        let mut delivered = 0u64;

        while let Some(envelope) = rx.blocking_recv() {
            if shutdown.is_cancelled() {
                debug!(table = %stream, delivered, "[writer] Shutdown requested, stopping");
                break;
            }
            match envelope {
                Envelope::Message(message) => {
                    sink.write(&message)?;
                    delivered += 1;
                }
                Envelope::Barrier(ack) => {
                    sink.flush()?;
                    // The orchestrator may have given up waiting.
                    let _ = ack.send(());
                }
            }
        }

        sink.flush()?;
        debug!(table = %stream, delivered, "[writer] Drained queue");
        Ok(sink)
    }
}
