//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown. Only the first one
//! starts the drain; repeats are logged and ignored so the deadline holds.

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Spawn the task that forwards termination signals to `shutdown`.
///
/// Handlers are registered before this returns, so a signal arriving right
/// after is not lost.
pub fn spawn_signal_watcher(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
                forward(&shutdown, name);
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "Failed to listen for Ctrl+C");
                    return;
                }
                forward(&shutdown, "Ctrl+C");
            }
        }))
    }
}

fn forward(shutdown: &Shutdown, name: &str) {
    if shutdown.trigger() {
        tracing::info!(signal = name, "Received termination signal, shutting down");
    } else {
        tracing::debug!(signal = name, "Shutdown already in progress, ignoring signal");
    }
}
