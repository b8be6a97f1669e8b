//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! A single [`CancellationToken`] is fanned out to the HTTP server and the
//! settlement executor. On signal the server stops accepting requests and
//! in-flight settlements stop at a resumable point: records are left
//! `pending` or `submitted`, never forced into a terminal state they did not
//! earn.

use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Watches for shutdown signals and trips a cancellation token.
pub struct ShutdownSignal {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl ShutdownSignal {
    /// Registers the signal handlers. Fails only if signal registration is
    /// refused by the OS.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    inner.cancel();
                },
                _ = sigint.recv() => {
                    inner.cancel();
                }
            }
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token: outer,
        })
    }

    /// Token to hand out to subsystems that should stop on shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Waits for a shutdown signal, then for the handler task to finish.
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}
