//! Bounded exponential backoff for fallible async operations.
//!
//! Used for object reads (manifests, data files) and for whole-file
//! extraction attempts. Attempt `n` (1-based) waits
//! `min(base * 2^(n-1), max)` plus up to 10% jitter before running again.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::emit;
use crate::metrics::events::RetryAttempted;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    10_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Random extra delay of up to a tenth of `delay`.
pub fn random_jitter(delay: Duration) -> Duration {
    let max_ms = (delay.as_millis() / 10) as u64;
    if max_ms > 0 {
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    } else {
        Duration::ZERO
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned as-is.
///
/// When `shutdown` fires during a backoff sleep the last error is returned
/// immediately instead of sleeping out the delay.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    shutdown: Option<&CancellationToken>,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= policy.attempts() || !is_retryable(&err) {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        let delay = delay + random_jitter(delay);
        warn!(
            operation,
            attempt,
            max_attempts = policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying"
        );
        emit!(RetryAttempted {
            operation: operation.to_string(),
        });

        match shutdown {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(err),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
        attempt += 1;
    }
}
