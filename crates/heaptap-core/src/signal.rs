//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolve with the name of the first shutdown signal received.
///
/// Listens for SIGINT and SIGTERM. If the handlers cannot be installed this
/// never resolves and the run cannot be interrupted gracefully.
#[cfg(unix)]
pub async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(mut interrupt), Ok(mut terminate)) => tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        },
        _ => {
            warn!("Could not install signal handlers; graceful shutdown disabled");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "CTRL_C",
        Err(_) => {
            warn!("Could not install Ctrl-C handler; graceful shutdown disabled");
            std::future::pending().await
        }
    }
}

/// A token cancelled by the first shutdown signal.
///
/// In-flight work observes the token and stops at its next check; the last
/// persisted checkpoint stays valid. Must be called inside a tokio runtime.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = shutdown_signal() => {
                info!(signal, "Shutdown requested, stopping after in-flight work");
                trigger.cancel();
            }
            _ = trigger.cancelled() => {}
        }
    });
    token
}
