//! Handlers for the `/generate` resource.
//!
//! Submission only validates and enqueues; the pipeline runs in the
//! background and clients poll `GET /generate/{id}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use covergen_core::job::{GenerationJob, JobStatus, Workflow};
use covergen_core::request::GenerateCoverRequest;
use covergen_core::types::{JobId, Timestamp};
use covergen_pipeline::registry::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use covergen_pipeline::JobFilter;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Returned by `POST /generate`.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Client-facing state of one job.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub workflow: Workflow,
    pub title: String,
    pub result_url: Option<String>,
    pub error: Option<String>,
    /// Human-readable description of `status`.
    pub message: &'static str,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&GenerationJob> for JobView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            workflow: job.request.workflow,
            title: job.request.title.clone(),
            result_url: job.result_url().map(str::to_string),
            error: job.error.clone(),
            message: job.status.message(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobView>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct PreviewView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub preview_url: String,
}

/// Query parameters of `GET /generate`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/generate
///
/// Validate the request and enqueue a job. Returns 202 with the job id;
/// invalid input is rejected with 400 before any job exists.
pub async fn submit_cover(
    State(state): State<AppState>,
    payload: Result<Json<GenerateCoverRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let request = input.into_request()?;
    let job = state.service.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted {
                job_id: job.id,
                status: job.status,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/generate
///
/// Newest first. Supports optional `status`, `limit` and `offset`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = params.status.as_deref().map(JobStatus::parse).transpose()?;
    let filter = JobFilter {
        status,
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
    };

    let page = state.service.list(filter).await;
    Ok(Json(DataResponse {
        data: JobList {
            jobs: page.jobs.iter().map(JobView::from).collect(),
            total: page.total,
            limit: filter.limit.clamp(1, MAX_PAGE_SIZE),
            offset: filter.offset,
        },
    }))
}

/// GET /api/v1/generate/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.get(job_id).await?;
    Ok(Json(DataResponse {
        data: JobView::from(&job),
    }))
}

/// GET /api/v1/generate/{id}/preview
///
/// Only available while the job is `preview_ready`; otherwise 409.
pub async fn get_preview(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let preview_url = state.service.preview(job_id).await?;
    Ok(Json(DataResponse {
        data: PreviewView {
            job_id,
            status: JobStatus::PreviewReady,
            preview_url,
        },
    }))
}

// ---------------------------------------------------------------------------
// Approve / cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/generate/{id}/approve
///
/// Promote the preview to the final cover. A repeated approval is 409; a
/// storage failure fails the job and is reported as 502.
pub async fn approve_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.approve(job_id).await?;
    Ok(Json(DataResponse {
        data: JobView::from(&job),
    }))
}

/// DELETE /api/v1/generate/{id}
///
/// Cancel a job that has not finished. Terminal jobs answer 409.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.cancel(job_id).await?;
    Ok(Json(DataResponse {
        data: JobView::from(&job),
    }))
}
