//! Service facade: submit, query, cancel and approve generation jobs.

use std::sync::Arc;
use std::time::Duration;

use covergen_core::error::CoreError;
use covergen_core::job::{GenerationJob, JobStatus};
use covergen_core::request::GenerationRequest;
use covergen_core::types::JobId;

use crate::registry::{JobFilter, JobPage, JobRegistry};
use crate::runner::Stage;
use crate::scheduler::JobScheduler;
use crate::storage::ArtifactStore;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stage failed while the caller waited for it (approval finalize).
    #[error("Stage '{stage}' failed: {message}")]
    StageFailure { stage: Stage, message: String },
}

pub struct GenerationService {
    registry: Arc<JobRegistry>,
    scheduler: Arc<JobScheduler>,
    store: Arc<dyn ArtifactStore>,
}

impl std::fmt::Debug for GenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationService").finish_non_exhaustive()
    }
}

/// Releases an approval claim when dropped, including when the approving
/// future is dropped mid-flight.
struct ApprovalClaim<'a> {
    registry: &'a JobRegistry,
    job_id: JobId,
}

impl Drop for ApprovalClaim<'_> {
    fn drop(&mut self) {
        self.registry.release_approval(self.job_id);
    }
}

impl GenerationService {
    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        let pipeline = scheduler.pipeline();
        Self {
            registry: Arc::clone(pipeline.registry()),
            store: Arc::clone(pipeline.store()),
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// Create a `queued` job and schedule its pipeline run.
    pub async fn submit(&self, request: GenerationRequest) -> Result<GenerationJob, ServiceError> {
        let job = GenerationJob::new(uuid::Uuid::now_v7(), Arc::new(request));
        self.registry.insert(job.clone()).await?;
        tracing::info!(
            job_id = %job.id,
            workflow = ?job.request.workflow,
            size = %job.request.size,
            preset = job.request.size.is_preset(),
            "Generation job submitted",
        );
        self.scheduler.schedule(job.id);
        Ok(job)
    }

    pub async fn get(&self, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        Ok(self.registry.require(job_id).await?)
    }

    pub async fn list(&self, filter: JobFilter) -> JobPage {
        self.registry.list(filter).await
    }

    /// Preview URL of a job awaiting approval.
    pub async fn preview(&self, job_id: JobId) -> Result<String, ServiceError> {
        let job = self.registry.require(job_id).await?;
        match (job.status, job.result) {
            (JobStatus::PreviewReady, Some(artifact)) => Ok(artifact.url),
            (status, _) => Err(CoreError::Conflict(format!(
                "Job {job_id} has no preview (status: {status})"
            ))
            .into()),
        }
    }

    /// Cancel a job that has not reached a terminal status.
    ///
    /// Cancelling a `preview_ready` job also removes its preview, best-effort.
    pub async fn cancel(&self, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        let (job, previous) = self.registry.cancel(job_id).await?;
        tracing::info!(job_id = %job_id, previous = %previous, "Generation job cancelled");

        if previous == JobStatus::PreviewReady {
            if let Err(e) = self.store.cleanup_preview(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Preview cleanup failed");
            }
        }
        Ok(job)
    }

    /// Promote the preview of a `preview_ready` job to the final artifact.
    ///
    /// A second approval, concurrent or after completion, is a
    /// [`CoreError::Conflict`]. A storage failure fails the job and is
    /// returned as [`ServiceError::StageFailure`].
    pub async fn approve(&self, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        self.registry.claim_approval(job_id).await?;
        let _claim = ApprovalClaim {
            registry: &self.registry,
            job_id,
        };

        let url = match self.store.finalize(job_id).await {
            Ok(url) => url,
            Err(e) => {
                let message = format!("Finalizing the preview failed: {e}");
                tracing::error!(job_id = %job_id, error = %e, "Approval failed");
                self.registry.update(job_id, |j| j.fail(&message)).await?;
                return Err(ServiceError::StageFailure {
                    stage: Stage::Finalize,
                    message,
                });
            }
        };

        let job = self.registry.update(job_id, |j| j.complete(url.clone())).await?;
        tracing::info!(job_id = %job_id, url = %url, "Generation job approved");

        if let Err(e) = self.store.cleanup_preview(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Preview cleanup failed");
        }
        Ok(job)
    }

    /// Drop terminal jobs not updated within `retention`. Returns how many.
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = chrono::Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        self.registry.purge_finished_before(cutoff).await
    }
}
