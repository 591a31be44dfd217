//! [`ImageSynthesizer`] backed by a ComfyUI server.
//!
//! A synthesis submits the txt2img workflow, polls `/history` until the
//! prompt finishes, downloads the output via `/view` and resizes it to the
//! exact requested size. Calls are gated by a semaphore so at most
//! `max_concurrent` prompts are in flight against the server.

use std::time::Duration;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tokio::sync::Semaphore;

use crate::api::{parse_history, ComfyUIApi, HistoryState};
use crate::synthesizer::{ImageSynthesizer, SynthesisError, SynthesisRequest};
use crate::workflow::build_txt2img;

/// Connection settings for [`ComfyUISynthesizer`].
#[derive(Debug, Clone)]
pub struct ComfyUIConfig {
    /// Base HTTP URL, e.g. `http://localhost:8188`.
    pub api_url: String,
    /// Checkpoint file name passed to `CheckpointLoaderSimple`.
    pub checkpoint: String,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
}

pub struct ComfyUISynthesizer {
    api: ComfyUIApi,
    checkpoint: String,
    permits: Semaphore,
    poll_interval: Duration,
    /// Identifies this service to ComfyUI.
    client_id: String,
}

impl ComfyUISynthesizer {
    pub fn new(config: ComfyUIConfig) -> Self {
        Self {
            api: ComfyUIApi::new(config.api_url),
            checkpoint: config.checkpoint,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            poll_interval: config.poll_interval,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    async fn wait_for_output(&self, prompt_id: &str) -> Result<crate::api::OutputImage, SynthesisError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let history = self.api.get_history(prompt_id).await?;
            match parse_history(&history, prompt_id) {
                HistoryState::Pending => continue,
                HistoryState::Failed(reason) => return Err(SynthesisError::Permanent(reason)),
                HistoryState::Ready(image) => return Ok(image),
            }
        }
    }
}

#[async_trait]
impl ImageSynthesizer for ComfyUISynthesizer {
    fn name(&self) -> &'static str {
        "comfyui"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SynthesisError::Transient("synthesizer is shutting down".to_string()))?;

        let workflow = build_txt2img(request, &self.checkpoint);
        let submitted = self.api.submit_workflow(&workflow, &self.client_id).await?;
        tracing::info!(
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            "Submitted workflow to ComfyUI",
        );

        let output = self.wait_for_output(&submitted.prompt_id).await?;
        let bytes = self.api.fetch_image(&output).await?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| SynthesisError::Permanent(format!("Unreadable model output: {e}")))?
            .to_rgba8();

        tracing::debug!(
            prompt_id = %submitted.prompt_id,
            width = image.width(),
            height = image.height(),
            "Downloaded ComfyUI output",
        );

        if image.dimensions() == (request.width, request.height) {
            Ok(image)
        } else {
            Ok(imageops::resize(&image, request.width, request.height, FilterType::Lanczos3))
        }
    }
}
