#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use covergen_comfyui::{GradientSynthesizer, ImageSynthesizer};
use covergen_core::font::BlockFont;
use covergen_core::job::JobStatus;
use covergen_core::layout::LayoutZones;
use covergen_core::style::{StyleCatalog, StyleResolver};
use covergen_pipeline::{
    ArtifactStore, GenerationService, LocalArtifactStore, MemoryArtifactStore, PipelineSettings,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use covergen_api::config::ServerConfig;
use covergen_api::engine;
use covergen_api::router::{build_app_router, ArtifactMount};
use covergen_api::state::AppState;

/// Public URL prefix of artifacts in tests that use local storage.
pub const ARTIFACTS_PATH: &str = "/artifacts";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 2 * 1024 * 1024,
    }
}

pub struct TestApp {
    pub router: Router,
    pub service: Arc<GenerationService>,
    /// Set when the app runs over the in-memory store.
    pub store: Option<Arc<MemoryArtifactStore>>,
}

/// Full application over the gradient synthesizer and an in-memory store.
pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(GradientSynthesizer::new()))
}

pub fn build_test_app_with(synthesizer: Arc<dyn ImageSynthesizer>) -> TestApp {
    let store = Arc::new(MemoryArtifactStore::new());
    let service = test_service(synthesizer, store.clone());
    let router = test_router(&service, None);
    TestApp {
        router,
        service,
        store: Some(store),
    }
}

/// Full application writing artifacts under `root` and serving them at
/// [`ARTIFACTS_PATH`], as the production binary does.
pub async fn build_local_test_app(root: &Path) -> TestApp {
    let local = LocalArtifactStore::new(root, ARTIFACTS_PATH);
    local.ensure_dirs().await.unwrap();
    let service = test_service(Arc::new(GradientSynthesizer::new()), Arc::new(local));
    let mount = ArtifactMount {
        path: ARTIFACTS_PATH.to_string(),
        dir: root.to_path_buf(),
    };
    let router = test_router(&service, Some(&mount));
    TestApp {
        router,
        service,
        store: None,
    }
}

fn test_service(
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: Arc<dyn ArtifactStore>,
) -> Arc<GenerationService> {
    let zones = LayoutZones::cover_default();
    let resolver = StyleResolver::new(StyleCatalog::builtin(), &zones).unwrap();
    engine::assemble(
        synthesizer,
        store,
        resolver,
        zones,
        Arc::new(BlockFont),
        PipelineSettings {
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    )
}

/// The production router and middleware stack over `service`.
fn test_router(service: &Arc<GenerationService>, artifacts: Option<&ArtifactMount>) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::clone(service),
    };
    build_app_router(state, &config, artifacts)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

pub async fn post_empty(app: &Router, uri: &str) -> Response {
    send(app, Method::POST, uri, Body::empty()).await
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /generate/{id}` until the job reports `status` or a terminal
/// status. Returns the last `data` object.
pub async fn wait_for_status(app: &Router, job_id: &str, status: JobStatus) -> serde_json::Value {
    let uri = format!("/api/v1/generate/{job_id}");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let data = body_json(get(app, &uri).await).await["data"].clone();
        let current = data["status"].as_str().unwrap_or_default().to_string();
        let current = JobStatus::parse(&current).unwrap();
        if current == status || current.is_terminal() {
            return data;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {current}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
