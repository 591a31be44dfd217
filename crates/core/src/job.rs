//! Generation job record and its lifecycle state machine.
//!
//! Transition rules:
//! - `queued`        -> `processing`, `cancelled`
//! - `processing`    -> `completed`, `preview_ready`, `failed`, `cancelled`
//! - `preview_ready` -> `completed`, `failed`, `cancelled`
//! - `completed`, `failed`, `cancelled` are terminal.
//!
//! Every mutating method checks the rule table and returns
//! [`CoreError::Conflict`] for an illegal move, leaving the record untouched.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::request::GenerationRequest;
use crate::types::{JobId, Timestamp};

/// Maximum length, in characters, of a recorded failure reason.
pub const MAX_ERROR_LENGTH: usize = 500;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    PreviewReady,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::PreviewReady,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::PreviewReady => "preview_ready",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status name as used on the wire.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid job status '{value}'. Must be one of: {:?}",
                    Self::ALL.map(JobStatus::as_str)
                ))
            })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses this status may move to.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[JobStatus::Processing, JobStatus::Cancelled],
            JobStatus::Processing => &[
                JobStatus::Completed,
                JobStatus::PreviewReady,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::PreviewReady => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Short human-readable description shown alongside the status.
    pub fn message(self) -> &'static str {
        match self {
            JobStatus::Queued => "Job is queued",
            JobStatus::Processing => "Cover image is being generated",
            JobStatus::PreviewReady => "Preview is ready for approval",
            JobStatus::Completed => "Cover image is ready",
            JobStatus::Failed => "Generation failed",
            JobStatus::Cancelled => "Job was cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// What happens after a successful pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Store the final artifact and complete immediately.
    #[default]
    Automated,
    /// Store a preview and wait for approval.
    Manual,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preview,
    Final,
}

/// Location of a stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// One cover generation request and its progress.
///
/// `result` is set exactly when the status is `preview_ready` (preview
/// artifact) or `completed` (final artifact); `error` exactly when `failed`.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: JobId,
    pub status: JobStatus,
    pub request: Arc<GenerationRequest>,
    pub result: Option<ArtifactRef>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Incremented on every mutation.
    pub version: u64,
}

impl GenerationJob {
    pub fn new(id: JobId, request: Arc<GenerationRequest>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            request,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.url.as_str())
    }

    /// `queued -> processing`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing)
    }

    /// `processing -> preview_ready`, recording the preview location.
    pub fn park_preview(&mut self, url: String) -> Result<(), CoreError> {
        self.transition(JobStatus::PreviewReady)?;
        self.result = Some(ArtifactRef {
            kind: ArtifactKind::Preview,
            url,
        });
        Ok(())
    }

    /// `processing | preview_ready -> completed`, recording the final location.
    pub fn complete(&mut self, url: String) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(ArtifactRef {
            kind: ArtifactKind::Final,
            url,
        });
        Ok(())
    }

    /// Move to `failed`, dropping any result and keeping a truncated reason.
    pub fn fail(&mut self, reason: &str) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.result = None;
        self.error = Some(truncate_message(reason, MAX_ERROR_LENGTH));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Cancelled)?;
        self.result = None;
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Cannot move job {} from '{}' to '{}'",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        self.version += 1;
        Ok(())
    }
}

/// Cut `message` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GenerationRequest;
    use assert_matches::assert_matches;

    fn job() -> GenerationJob {
        let request = GenerationRequest::titled("Bitcoin Reaches New High");
        GenerationJob::new(uuid::Uuid::now_v7(), Arc::new(request))
    }

    /// `result` iff preview_ready/completed, `error` iff failed.
    fn assert_invariant(job: &GenerationJob) {
        let has_result = matches!(job.status, JobStatus::PreviewReady | JobStatus::Completed);
        assert_eq!(job.result.is_some(), has_result, "{:?}", job.status);
        assert_eq!(job.error.is_some(), job.status == JobStatus::Failed);
    }

    #[test]
    fn new_job_is_queued() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.version, 1);
        assert_invariant(&job);
    }

    #[test]
    fn automated_path_completes() {
        let mut job = job();
        job.start().unwrap();
        job.complete("/artifacts/covers/a.png".into()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_ref().unwrap().kind, ArtifactKind::Final);
        assert_eq!(job.version, 3);
        assert_invariant(&job);
    }

    #[test]
    fn manual_path_parks_then_completes() {
        let mut job = job();
        job.start().unwrap();
        job.park_preview("/artifacts/previews/a.png".into()).unwrap();
        assert_eq!(job.result.as_ref().unwrap().kind, ArtifactKind::Preview);
        assert_invariant(&job);
        job.complete("/artifacts/covers/a.png".into()).unwrap();
        assert_eq!(job.result_url(), Some("/artifacts/covers/a.png"));
        assert_invariant(&job);
    }

    #[test]
    fn failure_drops_result_and_records_reason() {
        let mut job = job();
        job.start().unwrap();
        job.park_preview("/p.png".into()).unwrap();
        job.fail("storage unavailable").unwrap();
        assert_eq!(job.error.as_deref(), Some("storage unavailable"));
        assert_invariant(&job);
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn cancel_after_completion_is_conflict_and_leaves_record_unchanged() {
        let mut job = job();
        job.start().unwrap();
        job.complete("/c.png".into()).unwrap();
        let version = job.version;

        assert_matches!(job.cancel(), Err(CoreError::Conflict(_)));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.version, version);
        assert_eq!(job.result_url(), Some("/c.png"));
    }

    #[test]
    fn queued_job_cannot_skip_processing() {
        let mut job = job();
        assert_matches!(job.complete("/c.png".into()), Err(CoreError::Conflict(_)));
        assert_matches!(job.park_preview("/p.png".into()), Err(CoreError::Conflict(_)));
        assert!(job.cancel().is_ok());
        assert_invariant(&job);
    }

    #[test]
    fn long_error_messages_are_truncated() {
        let mut job = job();
        job.start().unwrap();
        job.fail(&"x".repeat(2000)).unwrap();
        let error = job.error.unwrap();
        assert_eq!(error.chars().count(), MAX_ERROR_LENGTH);
        assert!(error.ends_with("..."));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let message = "é".repeat(10);
        assert_eq!(truncate_message(&message, 10), message);
        assert_eq!(truncate_message(&message, 5), "éé...");
    }

    #[test]
    fn status_parses_wire_names() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
        }
        assert_matches!(JobStatus::parse("done"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&JobStatus::PreviewReady).unwrap();
        assert_eq!(json, "\"preview_ready\"");
    }
}
