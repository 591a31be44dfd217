//! Route definitions for the `/generate` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generate;
use crate::state::AppState;

/// Routes mounted at `/generate`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> submit_cover
/// GET    /{id}            -> get_job
/// DELETE /{id}            -> cancel_job
/// GET    /{id}/preview    -> get_preview
/// POST   /{id}/approve    -> approve_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(generate::list_jobs).post(generate::submit_cover))
        .route("/{id}", get(generate::get_job).delete(generate::cancel_job))
        .route("/{id}/preview", get(generate::get_preview))
        .route("/{id}/approve", post(generate::approve_job))
}
