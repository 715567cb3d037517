//! Graceful shutdown coordination via `CancellationToken` + `TaskTracker`.

use std::time::Duration;

use groupcast_core::Hub;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default timeout for graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown of the listener and every session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker that session tasks are registered with.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Perform a graceful shutdown.
    ///
    /// 1. Cancel the token (the listener stops accepting)
    /// 2. Ask every hub connection to close
    /// 3. Wait up to `timeout` for tracked sessions to finish
    ///
    /// Returns `false` if sessions were still running at the deadline.
    pub async fn graceful_shutdown(&self, hub: &Hub, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let closing = hub.shutdown();
        let _ = self.tracker.close();
        info!(
            connections = closing,
            sessions = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to finish"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_sets_flag() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_hub_and_waits() {
        let coord = ShutdownCoordinator::new();
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        let closing = conn.closing_token();

        let _task = coord.tracker().spawn(async move {
            closing.cancelled().await;
        });

        assert!(coord.graceful_shutdown(&hub, Some(Duration::from_secs(5))).await);
        assert!(coord.is_shutting_down());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let hub = Hub::new(4);

        let _task = coord.tracker().spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert!(!coord.graceful_shutdown(&hub, Some(Duration::from_millis(100))).await);
    }
}
