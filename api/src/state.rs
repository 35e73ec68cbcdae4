//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use shared::config::WindowDefaults;
use shared::pipeline::Exporter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runs the export pipelines.
    exporter: Arc<Exporter>,
    /// Cancelled when the server shuts down; exports run on child tokens.
    shutdown: CancellationToken,
    /// Background export runs.
    tasks: TaskTracker,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(exporter: Exporter, shutdown: CancellationToken) -> Self {
        Self {
            exporter: Arc::new(exporter),
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    /// Returns a handle to the exporter.
    #[must_use]
    pub fn exporter(&self) -> Arc<Exporter> {
        Arc::clone(&self.exporter)
    }

    /// Returns the server shutdown token.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Tracker of the export runs started by the triggers.
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Closes the tracker and waits for every started export to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Default lookback windows for triggers without `startTime`.
    #[must_use]
    pub fn windows(&self) -> WindowDefaults {
        *self.exporter.windows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::client::AnalyticsClient;
    use shared::config::{ThrottleConfig, UpstreamConfig};
    use shared::sink::InMemorySink;
    use shared::throttle::Throttle;

    fn state() -> AppState {
        let throttle = Arc::new(Throttle::new(ThrottleConfig::default()));
        let client = AnalyticsClient::new(
            &UpstreamConfig::new("http://127.0.0.1:9", "token"),
            throttle,
        )
        .unwrap();
        let exporter = Exporter::new(Arc::new(client), Arc::new(InMemorySink::new()));
        AppState::new(exporter, CancellationToken::new())
    }

    #[test]
    fn test_default_windows() {
        let windows = state().windows();
        assert_eq!(windows.traces_ms, 20_000);
        assert_eq!(windows.metrics_ms, 5_000);
    }

    #[test]
    fn test_clones_share_shutdown_token() {
        let state = state();
        let clone = state.clone();

        state.shutdown().cancel();
        assert!(clone.shutdown().is_cancelled());
        assert!(Arc::ptr_eq(&state.exporter(), &clone.exporter()));
    }

    #[tokio::test]
    async fn test_drain_waits_for_tracked_exports() {
        let state = state();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let token = state.shutdown().child_token();

        state.tasks().spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        state.shutdown().cancel();
        state.drain().await;

        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert!(state.tasks().is_empty());
    }
}
