//! One pipeline run: resolve style, synthesize the background, overlay
//! text, overlay the watermark, persist.
//!
//! Runs are cooperative with respect to cancellation: the job status is
//! re-read before every stage and the commit is a state-machine transition,
//! so a job cancelled mid-run simply refuses the result. An in-flight model
//! call is never interrupted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use covergen_comfyui::{ImageSynthesizer, SynthesisError, SynthesisRequest};
use covergen_core::compositor::{compose, Element, ImageElement, Placement, TextAlign, TextElement};
use covergen_core::error::CoreError;
use covergen_core::job::{GenerationJob, JobStatus, Workflow};
use covergen_core::layout::{LayoutZones, ZONE_SUBTITLE, ZONE_TITLE, ZONE_WATERMARK};
use covergen_core::request::GenerationRequest;
use covergen_core::style::{StyleProfile, StyleResolver};
use covergen_core::text::FontFace;
use covergen_core::types::JobId;
use image::RgbaImage;
use rand::Rng;

use crate::registry::JobRegistry;
use crate::storage::{ArtifactStore, StorageError};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables for overlay sizing and the run deadline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on one whole run.
    pub timeout: Duration,
    /// Title font size as a fraction of the canvas height.
    pub title_size_ratio: f32,
    /// Subtitle font size as a fraction of the canvas height.
    pub subtitle_size_ratio: f32,
    pub text_color: [u8; 3],
    pub shadow_passes: u8,
    /// Longest watermark side as a fraction of the canvas width.
    pub watermark_max_width_fraction: f32,
    pub watermark_margin_px: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            title_size_ratio: 0.08,
            subtitle_size_ratio: 0.053,
            text_color: [255, 255, 255],
            shadow_passes: 3,
            watermark_max_width_fraction: 0.1,
            watermark_margin_px: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveStyle,
    Synthesize,
    OverlayText,
    OverlayWatermark,
    Persist,
    Finalize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ResolveStyle => "resolve_style",
            Stage::Synthesize => "synthesize",
            Stage::OverlayText => "overlay_text",
            Stage::OverlayWatermark => "overlay_watermark",
            Stage::Persist => "persist",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The job was cancelled; the run stops without touching the record.
    #[error("Job was cancelled")]
    Cancelled,

    #[error("Background synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("{stage} failed: {source}")]
    Compose {
        stage: Stage,
        #[source]
        source: CoreError,
    },

    #[error("Storing the artifact failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Internal(String),
}

impl StageError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Synthesis(e) => e.is_transient(),
            StageError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// What a successful run stored.
enum Stored {
    Final(String),
    Preview(String),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything a run needs. Shared by all runs.
pub struct GenerationPipeline {
    registry: Arc<JobRegistry>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: Arc<dyn ArtifactStore>,
    resolver: Arc<StyleResolver>,
    zones: Arc<LayoutZones>,
    font: Arc<dyn FontFace>,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(
        registry: Arc<JobRegistry>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        store: Arc<dyn ArtifactStore>,
        resolver: Arc<StyleResolver>,
        zones: Arc<LayoutZones>,
        font: Arc<dyn FontFace>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            synthesizer,
            store,
            resolver,
            zones,
            font,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn synthesizer_name(&self) -> &'static str {
        self.synthesizer.name()
    }

    /// Drive one job from `queued` to its outcome. Invoked once per job.
    pub async fn run(&self, job_id: JobId) {
        let job = match self.registry.update(job_id, GenerationJob::start).await {
            Ok(job) => job,
            Err(e) => {
                tracing::info!(job_id = %job_id, reason = %e, "Skipping pipeline run");
                return;
            }
        };
        tracing::info!(job_id = %job_id, workflow = ?job.request.workflow, "Pipeline started");

        let outcome = tokio::time::timeout(self.settings.timeout, self.execute(job_id, &job.request))
            .await
            .unwrap_or(Err(StageError::Timeout(self.settings.timeout)));

        match outcome {
            Ok(stored) => self.commit(job_id, stored).await,
            Err(StageError::Cancelled) => {
                tracing::info!(job_id = %job_id, "Pipeline stopped: job cancelled");
            }
            Err(e) => self.record_failure(job_id, &e).await,
        }
    }

    async fn execute(&self, job_id: JobId, request: &GenerationRequest) -> Result<Stored, StageError> {
        self.checkpoint(job_id, Stage::ResolveStyle).await?;
        let profile = self.resolver.resolve(request);

        self.checkpoint(job_id, Stage::Synthesize).await?;
        let background = self.synthesize(job_id, request, &profile).await?;

        self.checkpoint(job_id, Stage::OverlayText).await?;
        let mut image = self
            .overlay(Stage::OverlayText, background, self.text_elements(request))
            .await?;

        if let Some(element) = self.watermark_element(request) {
            self.checkpoint(job_id, Stage::OverlayWatermark).await?;
            image = self
                .overlay(Stage::OverlayWatermark, image, vec![element])
                .await?;
        }

        self.checkpoint(job_id, Stage::Persist).await?;
        let stored = match request.workflow {
            Workflow::Automated => Stored::Final(self.store.store_final(job_id, &image).await?),
            Workflow::Manual => Stored::Preview(self.store.store_preview(job_id, &image).await?),
        };
        Ok(stored)
    }

    async fn synthesize(
        &self,
        job_id: JobId,
        request: &GenerationRequest,
        profile: &StyleProfile,
    ) -> Result<RgbaImage, StageError> {
        let seed = request.seed.unwrap_or_else(|| rand::rng().random());
        let synthesis = SynthesisRequest {
            prompt: profile.base_prompt.clone(),
            negative_prompt: profile.negative_prompt.clone(),
            width: request.size.width,
            height: request.size.height,
            style_binding: profile.style_binding.clone(),
            steps: request.steps,
            guidance: request.guidance,
            seed,
        };
        tracing::debug!(
            job_id = %job_id,
            seed,
            backend = self.synthesizer.name(),
            binding = profile.style_binding.as_ref().map(|b| b.name.as_str()),
            "Synthesizing background",
        );

        let background = self.synthesizer.synthesize(&synthesis).await?;
        if background.dimensions() != (request.size.width, request.size.height) {
            return Err(StageError::Internal(format!(
                "Synthesizer returned {}x{}, expected {}",
                background.width(),
                background.height(),
                request.size
            )));
        }
        Ok(background)
    }

    fn text_elements(&self, request: &GenerationRequest) -> Vec<Element> {
        let height = request.size.height as f32;
        let mut elements = vec![Element::Text(TextElement {
            content: request.title.clone(),
            font_px: height * self.settings.title_size_ratio,
            color: self.settings.text_color,
            placement: Placement::zone(ZONE_TITLE),
            align: TextAlign::Center,
            shadow_passes: self.settings.shadow_passes,
        })];
        if let Some(subtitle) = &request.subtitle {
            elements.push(Element::Text(TextElement {
                content: subtitle.clone(),
                font_px: height * self.settings.subtitle_size_ratio,
                color: self.settings.text_color,
                placement: Placement::zone(ZONE_SUBTITLE),
                align: TextAlign::Center,
                shadow_passes: self.settings.shadow_passes,
            }));
        }
        elements
    }

    fn watermark_element(&self, request: &GenerationRequest) -> Option<Element> {
        request.watermark.as_ref().map(|w| {
            Element::Image(ImageElement {
                image: w.image.clone(),
                opacity: w.opacity,
                placement: Placement::zone(ZONE_WATERMARK),
                align: w.position,
                max_width_fraction: self.settings.watermark_max_width_fraction,
                margin_px: self.settings.watermark_margin_px,
                shadow_passes: 1,
            })
        })
    }

    /// Run the compositor on the blocking pool.
    async fn overlay(
        &self,
        stage: Stage,
        image: RgbaImage,
        elements: Vec<Element>,
    ) -> Result<RgbaImage, StageError> {
        let zones = Arc::clone(&self.zones);
        let font = Arc::clone(&self.font);
        tokio::task::spawn_blocking(move || compose(&image, &elements, &zones, font.as_ref()))
            .await
            .map_err(|e| StageError::Internal(format!("{stage} task failed: {e}")))?
            .map_err(|source| StageError::Compose { stage, source })
    }

    async fn checkpoint(&self, job_id: JobId, stage: Stage) -> Result<(), StageError> {
        match self.registry.status(job_id).await {
            Some(JobStatus::Processing) => {
                tracing::debug!(job_id = %job_id, stage = %stage, "Entering stage");
                Ok(())
            }
            _ => Err(StageError::Cancelled),
        }
    }

    async fn commit(&self, job_id: JobId, stored: Stored) {
        match stored {
            Stored::Final(url) => {
                match self.registry.update(job_id, |j| j.complete(url.clone())).await {
                    Ok(_) => tracing::info!(job_id = %job_id, url = %url, "Cover completed"),
                    Err(e) => tracing::warn!(
                        job_id = %job_id,
                        error = %e,
                        "Discarding final cover of a job that is no longer processing",
                    ),
                }
            }
            Stored::Preview(url) => {
                match self.registry.update(job_id, |j| j.park_preview(url.clone())).await {
                    Ok(_) => tracing::info!(job_id = %job_id, url = %url, "Preview ready for approval"),
                    Err(e) => {
                        tracing::info!(job_id = %job_id, error = %e, "Removing preview of a job that is no longer processing");
                        if let Err(e) = self.store.cleanup_preview(job_id).await {
                            tracing::warn!(job_id = %job_id, error = %e, "Preview cleanup failed");
                        }
                    }
                }
            }
        }
    }

    async fn record_failure(&self, job_id: JobId, error: &StageError) {
        tracing::error!(
            job_id = %job_id,
            error = %error,
            transient = error.is_transient(),
            "Pipeline failed",
        );
        let reason = error.to_string();
        if let Err(e) = self.registry.update(job_id, |j| j.fail(&reason)).await {
            tracing::info!(job_id = %job_id, error = %e, "Failure not recorded: job already left processing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_model_and_timeout_are_transient() {
        let unavailable = StageError::from(SynthesisError::Transient("connection refused".into()));
        assert!(unavailable.is_transient());
        assert!(StageError::Timeout(Duration::from_secs(300)).is_transient());
    }

    #[test]
    fn rejected_request_and_cancellation_are_not_transient() {
        let rejected = StageError::from(SynthesisError::Permanent("invalid prompt".into()));
        assert!(!rejected.is_transient());
        assert!(!StageError::Cancelled.is_transient());
        assert!(!StageError::Internal("panicked".into()).is_transient());
    }
}
