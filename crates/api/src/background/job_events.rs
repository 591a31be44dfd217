//! Structured log of job status changes.

use covergen_pipeline::JobEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Log every event from `events` until the channel closes or `cancel` fires.
pub async fn run(mut events: broadcast::Receiver<JobEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => tracing::info!(
                    job_id = %event.job_id,
                    from = %event.from,
                    to = %event.to,
                    version = event.version,
                    "Job status changed",
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job event log lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("Job event log stopped");
}
