use std::sync::Arc;

use covergen_pipeline::GenerationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job registry, pipeline scheduler and artifact store behind one facade.
    pub service: Arc<GenerationService>,
}
