//! Assembles the generation service from [`GenerationConfig`].
//!
//! Every failure here is a deployment defect (unreadable zone file,
//! overlapping exclusive zones, bad font) and is reported before the server
//! starts listening.

use std::path::Path;
use std::sync::Arc;

use covergen_comfyui::{ComfyUISynthesizer, GradientSynthesizer, ImageSynthesizer};
use covergen_core::error::CoreError;
use covergen_core::font::{BlockFont, TrueTypeFont};
use covergen_core::layout::{LayoutZones, ZONE_SUBTITLE, ZONE_TITLE, ZONE_WATERMARK};
use covergen_core::style::{StyleCatalog, StyleResolver};
use covergen_core::text::FontFace;
use covergen_pipeline::{
    ArtifactStore, GenerationPipeline, GenerationService, JobRegistry, JobScheduler,
    LocalArtifactStore, PipelineSettings,
};

use crate::config::GenerationConfig;

/// Build the service over local storage and the configured synthesizer.
pub async fn build_service(config: &GenerationConfig) -> Result<Arc<GenerationService>, CoreError> {
    let zones = match &config.layout_zones_path {
        Some(path) => LayoutZones::from_json(&read_config_file(path).await?)?,
        None => LayoutZones::cover_default(),
    };
    for name in [ZONE_TITLE, ZONE_SUBTITLE, ZONE_WATERMARK] {
        zones.resolve(name)?;
    }
    tracing::info!(zones = zones.iter().count(), "Layout zones loaded");

    let catalog = match &config.style_catalog_path {
        Some(path) => StyleCatalog::from_json(&read_config_file(path).await?)?,
        None => StyleCatalog::builtin(),
    };
    let resolver = StyleResolver::new(catalog, &zones)?;

    let font: Arc<dyn FontFace> = match &config.font_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading overlay font");
            Arc::new(TrueTypeFont::from_file(path)?)
        }
        None => {
            tracing::warn!("FONT_PATH not set, overlays use the block font");
            Arc::new(BlockFont)
        }
    };

    let synthesizer: Arc<dyn ImageSynthesizer> = match &config.comfyui {
        Some(comfyui) => {
            tracing::info!(url = %comfyui.api_url, checkpoint = %comfyui.checkpoint, "Using ComfyUI backend");
            Arc::new(ComfyUISynthesizer::new(comfyui.clone()))
        }
        None => {
            tracing::warn!("COMFYUI_URL not set, using the gradient synthesizer");
            Arc::new(GradientSynthesizer::new())
        }
    };

    let store = LocalArtifactStore::new(config.storage_dir.clone(), &config.public_base_url);
    store.ensure_dirs().await.map_err(|e| {
        CoreError::Configuration(format!(
            "Storage directory {} is not usable: {e}",
            config.storage_dir.display()
        ))
    })?;
    let store: Arc<dyn ArtifactStore> = Arc::new(store);

    let settings = PipelineSettings {
        timeout: config.pipeline_timeout(),
        ..Default::default()
    };

    Ok(assemble(synthesizer, store, resolver, zones, font, settings))
}

/// Wire the pipeline, scheduler and service around a fresh registry.
pub fn assemble(
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: Arc<dyn ArtifactStore>,
    resolver: StyleResolver,
    zones: LayoutZones,
    font: Arc<dyn FontFace>,
    settings: PipelineSettings,
) -> Arc<GenerationService> {
    let pipeline = GenerationPipeline::new(
        Arc::new(JobRegistry::new()),
        synthesizer,
        store,
        Arc::new(resolver),
        Arc::new(zones),
        font,
        settings,
    );
    let scheduler = Arc::new(JobScheduler::new(Arc::new(pipeline)));
    Arc::new(GenerationService::new(scheduler))
}

async fn read_config_file(path: &Path) -> Result<String, CoreError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Configuration(format!("Cannot read {}: {e}", path.display())))
}
