//! Drives [`ComfyUISynthesizer`] against an in-process fake ComfyUI server.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use covergen_comfyui::{ComfyUIConfig, ComfyUISynthesizer, ImageSynthesizer, SynthesisError, SynthesisRequest};
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};

#[derive(Clone)]
struct Fake {
    /// `/history` polls answered with an empty body before the result appears.
    pending_polls: usize,
    polls: Arc<AtomicUsize>,
    submitted: Arc<std::sync::Mutex<Option<Value>>>,
    fail_execution: bool,
}

async fn submit(State(fake): State<Fake>, Json(body): Json<Value>) -> Json<Value> {
    *fake.submitted.lock().unwrap() = Some(body);
    Json(json!({"prompt_id": "p-1", "number": 0}))
}

async fn history(State(fake): State<Fake>, Path(id): Path<String>) -> Json<Value> {
    let n = fake.polls.fetch_add(1, Ordering::SeqCst);
    if n < fake.pending_polls {
        return Json(json!({}));
    }
    if fake.fail_execution {
        return Json(json!({id: {
            "status": {"status_str": "error", "completed": false,
                       "messages": [["execution_error", {"exception_message": "out of memory"}]]},
            "outputs": {}
        }}));
    }
    Json(json!({id: {
        "status": {"status_str": "success", "completed": true},
        "outputs": {"9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]}}
    }}))
}

async fn view(Query(q): Query<std::collections::HashMap<String, String>>) -> impl IntoResponse {
    if q.get("filename").map(String::as_str) != Some("out.png") {
        return (StatusCode::NOT_FOUND, Vec::new());
    }
    // The model renders at the 64-aligned size.
    let image = RgbaImage::from_pixel(1792, 896, Rgba([10, 20, 30, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    (StatusCode::OK, bytes.into_inner())
}

async fn spawn_fake(fake: Fake) -> String {
    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{id}", get(history))
        .route("/view", get(view))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fake(pending_polls: usize, fail_execution: bool) -> Fake {
    Fake {
        pending_polls,
        polls: Arc::new(AtomicUsize::new(0)),
        submitted: Arc::new(std::sync::Mutex::new(None)),
        fail_execution,
    }
}

fn synthesizer(api_url: String) -> ComfyUISynthesizer {
    ComfyUISynthesizer::new(ComfyUIConfig {
        api_url,
        checkpoint: "sdxl_base.safetensors".to_string(),
        max_concurrent: 1,
        poll_interval: Duration::from_millis(5),
    })
}

fn request() -> SynthesisRequest {
    SynthesisRequest {
        prompt: "dark cyberpunk".into(),
        negative_prompt: "text".into(),
        width: 1800,
        height: 900,
        style_binding: None,
        steps: 20,
        guidance: 7.0,
        seed: 99,
    }
}

#[tokio::test]
async fn polls_until_done_and_resizes_to_exact_target() {
    let fake = fake(2, false);
    let url = spawn_fake(fake.clone()).await;

    let image = synthesizer(url).synthesize(&request()).await.unwrap();

    assert_eq!(image.dimensions(), (1800, 900));
    assert!(fake.polls.load(Ordering::SeqCst) >= 3);
    let body = fake.submitted.lock().unwrap().clone().unwrap();
    assert_eq!(body["prompt"]["3"]["inputs"]["seed"], 99);
    assert_eq!(body["prompt"]["5"]["inputs"]["width"], 1792);
}

#[tokio::test]
async fn execution_error_is_permanent() {
    let url = spawn_fake(fake(0, true)).await;
    let err = synthesizer(url).synthesize(&request()).await.unwrap_err();
    assert_matches!(err, SynthesisError::Permanent(msg) if msg.contains("out of memory"));
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    // Nothing listens on port 9 locally.
    let err = synthesizer("http://127.0.0.1:9".to_string())
        .synthesize(&request())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
