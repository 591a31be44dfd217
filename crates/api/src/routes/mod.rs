pub mod generate;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate                       list, submit
/// /generate/{id}                  get, cancel (DELETE)
/// /generate/{id}/preview          preview URL while preview_ready
/// /generate/{id}/approve          promote preview to final (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/generate", generate::router())
}
