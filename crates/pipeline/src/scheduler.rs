//! Spawns pipeline runs as tracked tokio tasks.
//!
//! Each run is spawned in its own task and awaited by a supervising task on
//! the [`TaskTracker`], so a panicking run is observed and turned into a
//! `failed` job instead of vanishing. Shutdown closes the tracker and waits
//! for in-flight runs up to a grace period.

use std::sync::Arc;
use std::time::Duration;

use covergen_core::types::JobId;
use tokio_util::task::TaskTracker;

use crate::runner::GenerationPipeline;

pub struct JobScheduler {
    pipeline: Arc<GenerationPipeline>,
    tracker: TaskTracker,
}

impl JobScheduler {
    pub fn new(pipeline: Arc<GenerationPipeline>) -> Self {
        Self {
            pipeline,
            tracker: TaskTracker::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<GenerationPipeline> {
        &self.pipeline
    }

    /// Start the pipeline for `job_id` in the background.
    pub fn schedule(&self, job_id: JobId) {
        let pipeline = Arc::clone(&self.pipeline);
        self.tracker.spawn(async move {
            let run = tokio::spawn({
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.run(job_id).await }
            });

            if let Err(join_error) = run.await {
                let reason = if join_error.is_panic() {
                    "Pipeline run panicked"
                } else {
                    "Pipeline run was aborted"
                };
                tracing::error!(job_id = %job_id, error = %join_error, "{reason}");
                let recorded = pipeline
                    .registry()
                    .update(job_id, |j| j.fail(reason))
                    .await;
                if let Err(e) = recorded {
                    tracing::warn!(job_id = %job_id, error = %e, "Could not mark crashed run as failed");
                }
            }
        });
    }

    /// Number of runs still executing.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting runs and wait for in-flight ones, at most `grace`.
    ///
    /// Returns `true` when every run finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            tracing::info!(in_flight, grace_secs = grace.as_secs(), "Waiting for pipeline runs");
        }
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if !drained {
            tracing::warn!(remaining = self.tracker.len(), "Shutdown grace period elapsed with runs in flight");
        }
        drained
    }
}
