//! The image model boundary.

use async_trait::async_trait;
use covergen_core::style::StyleBinding;
use image::RgbaImage;

use crate::api::ComfyUIApiError;

/// Parameters for one background synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub style_binding: Option<StyleBinding>,
    pub steps: u32,
    pub guidance: f32,
    pub seed: u64,
}

/// Why the model did not return an image.
///
/// Both variants fail the current pipeline run; the distinction is kept
/// for logging and for callers that decide to resubmit.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Network trouble, overload, or a server-side error.
    #[error("Image model unavailable: {0}")]
    Transient(String),

    /// The model rejected or failed to execute the request.
    #[error("Image model failed: {0}")]
    Permanent(String),
}

impl SynthesisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SynthesisError::Transient(_))
    }
}

impl From<ComfyUIApiError> for SynthesisError {
    fn from(err: ComfyUIApiError) -> Self {
        match &err {
            ComfyUIApiError::Request(_) => SynthesisError::Transient(err.to_string()),
            ComfyUIApiError::ApiError { status, .. } if *status >= 500 || *status == 429 => {
                SynthesisError::Transient(err.to_string())
            }
            ComfyUIApiError::ApiError { .. } => SynthesisError::Permanent(err.to_string()),
        }
    }
}

/// Produces a background image from a prompt.
///
/// Implementations must return an image of exactly `width` x `height`.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn name(&self) -> &'static str;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbaImage, SynthesisError>;
}
