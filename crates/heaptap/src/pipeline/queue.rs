//! Bounded delivery queue between file workers and the writer.

use snafu::prelude::*;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{CancelledSnafu, PipelineError, QueueClosedSnafu, QueueTimeoutSnafu};
use crate::sink::Message;

/// Entry travelling through the queue.
pub(in crate::pipeline) enum Envelope {
    Message(Message),
    /// Acknowledged once everything ahead of it is delivered and flushed.
    Barrier(oneshot::Sender<()>),
}

/// Producer handle. Clones feed the same queue.
#[derive(Clone)]
pub(in crate::pipeline) struct DeliveryQueue {
    tx: mpsc::Sender<Envelope>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl DeliveryQueue {
    pub fn channel(
        capacity: usize,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                timeout,
                shutdown,
            },
            rx,
        )
    }

    /// Enqueue a message, waiting at most the queue timeout for space.
    pub async fn put(&self, message: Message) -> Result<(), PipelineError> {
        self.send(Envelope::Message(message)).await
    }

    /// Wait until every message enqueued so far has been flushed by the sink.
    pub async fn barrier(&self) -> Result<(), PipelineError> {
        let (ack, done) = oneshot::channel();
        self.send(Envelope::Barrier(ack)).await?;

        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => CancelledSnafu.fail(),
            result = done => result.ok().context(QueueClosedSnafu),
        }
    }

    async fn send(&self, envelope: Envelope) -> Result<(), PipelineError> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => CancelledSnafu.fail(),
            result = self.tx.send_timeout(envelope, self.timeout) => match result {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => QueueTimeoutSnafu {
                    timeout_secs: self.timeout.as_secs(),
                }
                .fail(),
                Err(SendTimeoutError::Closed(_)) => QueueClosedSnafu.fail(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(version: i64) -> Message {
        Message::ActivateVersion {
            stream: "events".to_string(),
            version,
        }
    }

    #[tokio::test]
    async fn test_put_times_out_when_full() {
        let (queue, _rx) =
            DeliveryQueue::channel(1, Duration::from_millis(20), CancellationToken::new());
        queue.put(message(1)).await.unwrap();

        let err = queue.put(message(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueTimeout { .. }));
    }

    #[tokio::test]
    async fn test_put_fails_once_receiver_is_gone() {
        let (queue, rx) =
            DeliveryQueue::channel(4, Duration::from_secs(1), CancellationToken::new());
        drop(rx);

        let err = queue.put(message(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueClosed));
    }

    #[tokio::test]
    async fn test_cancelled_put_returns_promptly() {
        let token = CancellationToken::new();
        let (queue, _rx) = DeliveryQueue::channel(1, Duration::from_secs(60), token.clone());
        queue.put(message(1)).await.unwrap();
        token.cancel();

        let err = queue.put(message(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_barrier_waits_for_ack() {
        let (queue, mut rx) =
            DeliveryQueue::channel(4, Duration::from_secs(1), CancellationToken::new());
        queue.put(message(1)).await.unwrap();

        let consumer = tokio::spawn(async move {
            let mut seen = 0;
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Message(_) => seen += 1,
                    Envelope::Barrier(ack) => {
                        let _ = ack.send(());
                        return seen;
                    }
                }
            }
            seen
        });

        queue.barrier().await.unwrap();
        assert_eq!(consumer.await.unwrap(), 1);
    }
}
