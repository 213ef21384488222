//! Background session services
//!
//! Two independent loops run beside the HTTP server:
//!
//! - [`peak::PeakTracker`] ratchets the persisted peak-concurrency statistic
//! - [`metrics::MetricsSampler`] publishes a metrics snapshot and purges stale
//!   sessions
//!
//! Both observe one shutdown signal. [`BackgroundTasks::shutdown`] raises it
//! and waits for both loops to finish their current tick.
//!
//! [`stats`] builds the on-demand administrative session report.

pub mod metrics;
pub mod peak;
pub mod stats;

pub use metrics::{MetricsHandle, MetricsSampler, MetricsSnapshot};
pub use peak::PeakTracker;
pub use stats::{session_stats, SessionStats, VisitorCount};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Join handles and shutdown signal for the background loops.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Spawns both loops on the current runtime.
    pub fn spawn(peak: PeakTracker, sampler: MetricsSampler) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let handles = vec![
            ("peak tracker", tokio::spawn(peak.run(rx.clone()))),
            ("metrics sampler", tokio::spawn(sampler.run(rx))),
        ];

        Self { shutdown, handles }
    }

    /// Signals every loop to stop and waits for them.
    pub async fn shutdown(self) {
        // Receivers also stop when the sender is dropped, so a send error
        // only means they are already gone.
        let _ = self.shutdown.send(true);

        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(task = name, "Background task ended abnormally: {}", e);
            }
        }

        tracing::info!("Background tasks stopped");
    }
}
