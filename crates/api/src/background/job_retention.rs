//! Periodic purge of finished jobs.
//!
//! Job history lives in memory only. Terminal jobs (`completed`, `failed`,
//! `cancelled`) that have not changed within the retention period are
//! dropped from the registry; their stored artifacts are left in place.

use std::sync::Arc;
use std::time::Duration;

use covergen_pipeline::GenerationService;
use tokio_util::sync::CancellationToken;

/// How often the purge runs.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    service: Arc<GenerationService>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_hours = retention.as_secs() / 3600,
        interval_secs = interval.as_secs(),
        "Job retention task started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = ticker.tick() => {
                let purged = service.purge_finished(retention).await;
                if purged > 0 {
                    tracing::info!(purged, "Job retention: purged finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to purge");
                }
            }
        }
    }
}
