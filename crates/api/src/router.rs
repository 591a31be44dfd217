//! Shared application router builder.
//!
//! Provides [`build_app_router`] so both the production binary (`main.rs`)
//! and integration tests (`tests/common/mod.rs`) use the exact same routes
//! and middleware stack.

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::{GenerationConfig, ServerConfig};
use crate::routes;
use crate::state::AppState;

/// Local directory of stored artifacts and the URL path it is served under.
#[derive(Debug, Clone)]
pub struct ArtifactMount {
    pub path: String,
    pub dir: PathBuf,
}

impl ArtifactMount {
    /// Mount for the storage directory, when public artifact URLs are local
    /// paths (`/artifacts`). Absolute URLs (a CDN) mount nothing.
    pub fn from_config(config: &GenerationConfig) -> Option<Self> {
        let path = config.public_base_url.trim_end_matches('/');
        path.starts_with('/').then(|| Self {
            path: path.to_string(),
            dir: config.storage_dir.clone(),
        })
    }
}

/// Build the full application [`Router`] with all middleware layers.
///
/// The middleware stack is applied bottom-up:
///
/// 1. CORS
/// 2. Set request ID on incoming requests
/// 3. Structured request/response tracing
/// 4. Propagate request ID to response
/// 5. Request timeout
/// 6. Panic recovery (catch panics, return 500)
/// 7. Body size limit
pub fn build_app_router(
    state: AppState,
    config: &ServerConfig,
    artifacts: Option<&ArtifactMount>,
) -> Router {
    let cors = build_cors_layer(config);
    let request_id_header = HeaderName::from_static("x-request-id");

    let mut app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes());

    if let Some(mount) = artifacts {
        app = app.nest_service(&mount.path, ServeDir::new(&mount.dir));
        tracing::info!(path = %mount.path, dir = %mount.dir.display(), "Serving stored artifacts");
    }

    app
        // -- Middleware stack (applied bottom-up) --
        // Watermarks arrive base64 encoded inside JSON bodies.
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state)
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid; misconfiguration
/// fails fast.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation_config(public_base_url: &str) -> GenerationConfig {
        GenerationConfig {
            comfyui: None,
            storage_dir: PathBuf::from("./storage"),
            public_base_url: public_base_url.to_string(),
            font_path: None,
            layout_zones_path: None,
            style_catalog_path: None,
            pipeline_timeout_secs: 300,
            job_retention_hours: 24,
        }
    }

    #[test]
    fn local_prefix_mounts_storage_dir() {
        let mount = ArtifactMount::from_config(&generation_config("/artifacts/")).unwrap();
        assert_eq!(mount.path, "/artifacts");
        assert_eq!(mount.dir, PathBuf::from("./storage"));
    }

    #[test]
    fn absolute_url_mounts_nothing() {
        let config = generation_config("https://cdn.example.com/covers");
        assert!(ArtifactMount::from_config(&config).is_none());
    }
}
