use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use covergen_api::background::{job_events, job_retention};
use covergen_api::config::{GenerationConfig, ServerConfig};
use covergen_api::router::{build_app_router, ArtifactMount};
use covergen_api::{engine, state};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "covergen_api=debug,covergen_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let generation = GenerationConfig::from_env();
    tracing::info!(
        storage_dir = %generation.storage_dir.display(),
        public_base_url = %generation.public_base_url,
        pipeline_timeout_secs = generation.pipeline_timeout_secs,
        "Loaded generation configuration"
    );

    // --- Generation service ---
    let service = engine::build_service(&generation)
        .await
        .expect("Failed to initialise the generation service");
    tracing::info!(
        synthesizer = service.scheduler().pipeline().synthesizer_name(),
        "Generation service ready"
    );

    // --- Background tasks ---
    let background_cancel = CancellationToken::new();

    let events_handle = tokio::spawn(job_events::run(
        service.registry().subscribe(),
        background_cancel.clone(),
    ));
    let retention_handle = tokio::spawn(job_retention::run(
        Arc::clone(&service),
        generation.job_retention(),
        job_retention::PURGE_INTERVAL,
        background_cancel.clone(),
    ));
    tracing::info!("Background tasks started (job event log, job retention)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::clone(&service),
    };

    // --- Router ---
    let artifacts = ArtifactMount::from_config(&generation);
    let app = build_app_router(state, &config, artifacts.as_ref());

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Let in-flight pipeline runs finish so their jobs reach a final status.
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if service.scheduler().shutdown(grace).await {
        tracing::info!("Pipeline runs drained");
    }

    background_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), events_handle).await;
    tracing::info!("Background tasks stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
