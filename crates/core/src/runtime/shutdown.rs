use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Manages graceful shutdown via CancellationToken.
/// Listens for SIGTERM / Ctrl+C and cancels the token, then drains handlers.
#[derive(Debug)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The cancellation token that all tasks should monitor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that listens for OS signals and triggers cancellation.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let terminate = signal::unix::SignalKind::terminate();
                let mut sigterm = match signal::unix::signal(terminate) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to register SIGTERM handler");
                        return;
                    }
                };
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating shutdown"),
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, initiating shutdown"),
                    _ = token.cancelled() => return,
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, initiating shutdown"),
                    _ = token.cancelled() => return,
                }
            }
            token.cancel();
        });
    }

    /// Stop accepting handlers and wait up to `limit` for the running ones.
    /// Returns false if some were still running when the limit elapsed.
    pub async fn drain(&self, tracker: &TaskTracker, limit: Duration) -> bool {
        tracker.close();
        if tokio::time::timeout(limit, tracker.wait()).await.is_ok() {
            return true;
        }
        tracing::warn!(
            in_flight = tracker.len(),
            timeout_secs = limit.as_secs(),
            "handlers still running at shutdown"
        );
        false
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}
