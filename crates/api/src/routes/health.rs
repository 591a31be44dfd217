use std::collections::BTreeMap;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Name of the background synthesizer in use.
    pub synthesizer: &'static str,
    /// Number of known jobs per status.
    pub jobs: BTreeMap<&'static str, usize>,
    /// Pipeline runs currently executing.
    pub in_flight: usize,
}

/// GET /health -- returns service status and job counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let jobs = state
        .service
        .registry()
        .counts()
        .await
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();

    let scheduler = state.service.scheduler();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        synthesizer: scheduler.pipeline().synthesizer_name(),
        jobs,
        in_flight: scheduler.in_flight(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
