//! In-memory job registry.
//!
//! [`JobRegistry`] exclusively owns every [`GenerationJob`]. All mutation goes
//! through [`JobRegistry::update`] (or the cancel/approval helpers built on the
//! same lock), which applies a state-machine method to a copy of the record
//! under the write lock and only stores it if the method succeeded. Readers
//! therefore never see a half-applied transition.
//!
//! Every status change is published on a [`tokio::sync::broadcast`] channel.
//! Call [`JobRegistry::subscribe`] to receive them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use covergen_core::error::CoreError;
use covergen_core::job::{GenerationJob, JobStatus};
use covergen_core::types::{JobId, Timestamp};
use tokio::sync::{broadcast, RwLock};

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default page size for [`JobRegistry::list`].
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Largest page size for [`JobRegistry::list`].
pub const MAX_PAGE_SIZE: usize = 100;

/// A status change of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
    /// Record version after the change.
    pub version: u64,
    pub at: Timestamp,
}

/// Listing criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// One page of jobs, newest first.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<GenerationJob>,
    /// Matching jobs before pagination.
    pub total: usize,
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, GenerationJob>>,
    /// Jobs whose approval is being finalized. Only touched while `jobs` is
    /// write-locked, except for release.
    approving: Mutex<HashSet<JobId>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            approving: Mutex::new(HashSet::new()),
            event_tx,
        }
    }

    /// Subscribe to job status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Add a freshly created job. Fails if the id is already taken.
    pub async fn insert(&self, job: GenerationJob) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(CoreError::Conflict(format!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    pub async fn get(&self, job_id: JobId) -> Option<GenerationJob> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// Like [`get`](Self::get) but unknown ids are [`CoreError::NotFound`].
    pub async fn require(&self, job_id: JobId) -> Result<GenerationJob, CoreError> {
        self.get(job_id).await.ok_or_else(|| not_found(job_id))
    }

    pub async fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs.read().await.get(&job_id).map(|j| j.status)
    }

    /// Apply `mutate` to the job atomically and return the updated record.
    ///
    /// If `mutate` fails the stored record is left exactly as it was.
    pub async fn update<F>(&self, job_id: JobId, mutate: F) -> Result<GenerationJob, CoreError>
    where
        F: FnOnce(&mut GenerationJob) -> Result<(), CoreError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        self.apply(job, mutate)
    }

    /// Cancel a job, returning the updated record and its previous status.
    ///
    /// Rejected with [`CoreError::Conflict`] for terminal jobs and while an
    /// approval of the job is being finalized.
    pub async fn cancel(&self, job_id: JobId) -> Result<(GenerationJob, JobStatus), CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        if self.is_approving(job_id) {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is being approved"
            )));
        }
        let previous = job.status;
        let updated = self.apply(job, GenerationJob::cancel)?;
        Ok((updated, previous))
    }

    /// Mark a `preview_ready` job as being approved.
    ///
    /// Only one approval per job may be in flight; a second claim, or a claim
    /// on a job in any other status, is a [`CoreError::Conflict`]. Release the
    /// claim with [`release_approval`](Self::release_approval).
    pub async fn claim_approval(&self, job_id: JobId) -> Result<GenerationJob, CoreError> {
        let jobs = self.jobs.write().await;
        let job = jobs.get(&job_id).ok_or_else(|| not_found(job_id))?;
        if job.status != JobStatus::PreviewReady {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is not awaiting approval (status: {})",
                job.status
            )));
        }
        let mut approving = self.approving.lock().unwrap_or_else(|e| e.into_inner());
        if !approving.insert(job_id) {
            return Err(CoreError::Conflict(format!(
                "Approval of job {job_id} is already in progress"
            )));
        }
        Ok(job.clone())
    }

    pub fn release_approval(&self, job_id: JobId) {
        self.approving
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job_id);
    }

    fn is_approving(&self, job_id: JobId) -> bool {
        self.approving
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&job_id)
    }

    /// Jobs matching `filter`, newest first.
    pub async fn list(&self, filter: JobFilter) -> JobPage {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<&GenerationJob> = jobs
            .values()
            .filter(|j| filter.status.map_or(true, |wanted| wanted == j.status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let limit = filter.limit.clamp(1, MAX_PAGE_SIZE);
        let jobs = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .cloned()
            .collect();
        JobPage { jobs, total }
    }

    /// Number of jobs per status, for every status.
    pub async fn counts(&self) -> Vec<(JobStatus, usize)> {
        let jobs = self.jobs.read().await;
        JobStatus::ALL
            .iter()
            .map(|s| (*s, jobs.values().filter(|j| j.status == *s).count()))
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drop terminal jobs last updated before `cutoff`. Returns how many.
    pub async fn purge_finished_before(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| !(j.is_terminal() && j.updated_at < cutoff));
        before - jobs.len()
    }

    fn apply<F>(&self, job: &mut GenerationJob, mutate: F) -> Result<GenerationJob, CoreError>
    where
        F: FnOnce(&mut GenerationJob) -> Result<(), CoreError>,
    {
        let mut draft = job.clone();
        mutate(&mut draft)?;
        let from = job.status;
        *job = draft;

        if from != job.status {
            // No receivers is fine.
            let _ = self.event_tx.send(JobEvent {
                job_id: job.id,
                from,
                to: job.status,
                version: job.version,
                at: job.updated_at,
            });
        }
        Ok(job.clone())
    }
}

fn not_found(job_id: JobId) -> CoreError {
    CoreError::NotFound {
        entity: "GenerationJob",
        id: job_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use covergen_core::request::GenerationRequest;
    use std::sync::Arc;

    fn new_job() -> GenerationJob {
        GenerationJob::new(
            uuid::Uuid::now_v7(),
            Arc::new(GenerationRequest::titled("Headline")),
        )
    }

    async fn registry_with(job: &GenerationJob) -> JobRegistry {
        let registry = JobRegistry::new();
        registry.insert(job.clone()).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn failed_mutation_leaves_record_untouched() {
        let job = new_job();
        let registry = registry_with(&job).await;

        let err = registry.update(job.id, |j| j.complete("/x.png".into())).await;
        assert_matches!(err, Err(CoreError::Conflict(_)));

        let stored = registry.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.version, job.version);
    }

    #[tokio::test]
    async fn status_changes_are_published() {
        let job = new_job();
        let registry = registry_with(&job).await;
        let mut events = registry.subscribe();

        registry.update(job.id, GenerationJob::start).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!((event.from, event.to), (JobStatus::Queued, JobStatus::Processing));
        assert_eq!(event.version, 2);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let registry = JobRegistry::new();
        let id = uuid::Uuid::now_v7();
        assert_matches!(registry.require(id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(registry.cancel(id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(registry.claim_approval(id).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn approval_claim_is_exclusive_and_blocks_cancel() {
        let job = new_job();
        let registry = registry_with(&job).await;
        registry.update(job.id, GenerationJob::start).await.unwrap();
        registry
            .update(job.id, |j| j.park_preview("/p.png".into()))
            .await
            .unwrap();

        registry.claim_approval(job.id).await.unwrap();
        assert_matches!(registry.claim_approval(job.id).await, Err(CoreError::Conflict(_)));
        assert_matches!(registry.cancel(job.id).await, Err(CoreError::Conflict(_)));

        registry.release_approval(job.id);
        let (cancelled, previous) = registry.cancel(job.id).await.unwrap();
        assert_eq!(previous, JobStatus::PreviewReady);
        assert_eq!(cancelled.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn claim_requires_preview_ready() {
        let job = new_job();
        let registry = registry_with(&job).await;
        assert_matches!(registry.claim_approval(job.id).await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_filters_and_paginates_newest_first() {
        let registry = JobRegistry::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let job = new_job();
            ids.push(job.id);
            registry.insert(job).await.unwrap();
        }
        registry.update(ids[0], GenerationJob::start).await.unwrap();

        let page = registry
            .list(JobFilter { status: None, limit: 2, offset: 1 })
            .await;
        assert_eq!(page.total, 5);
        assert_eq!(page.jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![ids[3], ids[2]]);

        let processing = registry
            .list(JobFilter { status: Some(JobStatus::Processing), ..Default::default() })
            .await;
        assert_eq!(processing.total, 1);
        assert_eq!(processing.jobs[0].id, ids[0]);
    }

    #[tokio::test]
    async fn purge_only_removes_old_terminal_jobs() {
        let registry = JobRegistry::new();
        let finished = new_job();
        let active = new_job();
        registry.insert(finished.clone()).await.unwrap();
        registry.insert(active.clone()).await.unwrap();
        registry.update(finished.id, GenerationJob::cancel).await.unwrap();

        let future = chrono::Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(registry.purge_finished_before(future).await, 1);
        assert!(registry.get(finished.id).await.is_none());
        assert!(registry.get(active.id).await.is_some());
    }

    #[tokio::test]
    async fn counts_cover_every_status() {
        let job = new_job();
        let registry = registry_with(&job).await;
        let counts = registry.counts().await;
        assert_eq!(counts.len(), JobStatus::ALL.len());
        assert!(counts.contains(&(JobStatus::Queued, 1)));
    }
}
