//! Periodic removal of finished jobs from the registry.
//!
//! Terminal jobs stay queryable for the configured retention window
//! (`JOB_RETENTION_SECS`). This task drops them, and their work
//! directories, once the window has passed.

use std::sync::Arc;
use std::time::Duration;

use gridlab_supervisor::Supervisor;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the retention sweep loop every `interval` until `cancel` is triggered.
pub async fn run(supervisor: Arc<Supervisor>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_secs = supervisor.config().retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Job retention sweep started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = supervisor.sweep_expired().await;
                if removed > 0 {
                    tracing::info!(removed, "Job retention: purged finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to purge");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
