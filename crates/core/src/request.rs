//! Generation request: the wire DTO accepted at submission and the
//! validated, immutable snapshot stored on the job.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbaImage;
use serde::Deserialize;
use validator::Validate;

use crate::compositor::{decode_image, Alignment};
use crate::error::CoreError;
use crate::job::Workflow;
use crate::style::{StyleBinding, VisualStyle};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Output size used when the request does not name one.
pub const DEFAULT_SIZE: ImageSize = ImageSize {
    width: 1800,
    height: 900,
};

/// Named size presets accepted besides explicit `WxH`.
pub const SIZE_PRESETS: [ImageSize; 2] = [
    DEFAULT_SIZE,
    ImageSize {
        width: 1920,
        height: 1080,
    },
];

pub const MIN_DIMENSION: u32 = 256;
pub const MAX_DIMENSION: u32 = 4096;

pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_GUIDANCE: f32 = 7.5;
pub const DEFAULT_WATERMARK_OPACITY: f32 = 0.7;

/// Largest accepted style binding weight.
pub const MAX_BINDING_WEIGHT: f32 = 2.0;

// ---------------------------------------------------------------------------
// Image size
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    /// Parse `WxH`, each side within `MIN_DIMENSION..=MAX_DIMENSION`.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let invalid = || {
            CoreError::Validation(format!(
                "Invalid size '{value}'. Expected WIDTHxHEIGHT, e.g. 1800x900"
            ))
        };
        let (w, h) = value.trim().to_ascii_lowercase().split_once('x').ok_or_else(invalid).and_then(
            |(w, h)| {
                let w: u32 = w.trim().parse().map_err(|_| invalid())?;
                let h: u32 = h.trim().parse().map_err(|_| invalid())?;
                Ok((w, h))
            },
        )?;

        for side in [w, h] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&side) {
                return Err(CoreError::Validation(format!(
                    "Size '{value}' out of range: each side must be between {MIN_DIMENSION} and {MAX_DIMENSION}"
                )));
            }
        }
        Ok(Self {
            width: w,
            height: h,
        })
    }

    pub fn is_preset(&self) -> bool {
        SIZE_PRESETS.contains(self)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Wire DTO
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/generate`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GenerateCoverRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 300, message = "Subtitle must be at most 300 characters"))]
    pub subtitle: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Client id must be between 1 and 100 characters"))]
    pub client_id: Option<String>,
    #[validate(length(max = 2000, message = "Custom prompt must be at most 2000 characters"))]
    pub custom_prompt: Option<String>,
    /// `dark | colorful | light`.
    pub style: Option<String>,
    #[validate(range(min = 1, max = 150, message = "Steps must be between 1 and 150"))]
    pub steps: Option<u32>,
    #[validate(range(min = 1.0, max = 30.0, message = "Guidance must be between 1.0 and 30.0"))]
    pub guidance: Option<f32>,
    pub seed: Option<u64>,
    pub style_binding: Option<StyleBinding>,
    /// Base64 encoded PNG/JPEG/WebP, optionally as a `data:` URL.
    pub watermark: Option<String>,
    /// `top-left | top-right | bottom-left | bottom-right | center`.
    pub watermark_position: Option<String>,
    #[validate(range(min = 0.0, max = 1.0, message = "Watermark opacity must be between 0.0 and 1.0"))]
    pub watermark_opacity: Option<f32>,
    #[serde(default)]
    pub workflow: Workflow,
    /// `WxH`; defaults to `1800x900`.
    pub size: Option<String>,
}

impl GenerateCoverRequest {
    /// Validate every field and decode the watermark.
    ///
    /// All failures are [`CoreError::Validation`]; nothing here depends on
    /// deployment configuration.
    pub fn into_request(self) -> Result<GenerationRequest, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::Validation("Title must not be blank".to_string()));
        }

        let visual_style = match self.style.as_deref() {
            Some(s) => VisualStyle::parse(s)?,
            None => VisualStyle::default(),
        };

        let size = match self.size.as_deref() {
            Some(s) => ImageSize::parse(s)?,
            None => DEFAULT_SIZE,
        };

        if let Some(binding) = &self.style_binding {
            validate_binding(binding)?;
        }

        let watermark = match self.watermark.as_deref() {
            Some(encoded) if !encoded.trim().is_empty() => Some(Watermark {
                image: decode_watermark(encoded)?,
                position: match self.watermark_position.as_deref() {
                    Some(p) => parse_position(p)?,
                    None => Alignment::default(),
                },
                opacity: self.watermark_opacity.unwrap_or(DEFAULT_WATERMARK_OPACITY),
            }),
            _ => None,
        };

        Ok(GenerationRequest {
            title,
            subtitle: non_blank(self.subtitle),
            client_id: non_blank(self.client_id),
            custom_prompt: non_blank(self.custom_prompt),
            visual_style,
            steps: self.steps.unwrap_or(DEFAULT_STEPS),
            guidance: self.guidance.unwrap_or(DEFAULT_GUIDANCE),
            seed: self.seed,
            style_binding: self.style_binding,
            watermark,
            size,
            workflow: self.workflow,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_binding(binding: &StyleBinding) -> Result<(), CoreError> {
    if binding.name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Style binding name must not be empty".to_string(),
        ));
    }
    if !(0.0..=MAX_BINDING_WEIGHT).contains(&binding.weight) {
        return Err(CoreError::Validation(format!(
            "Style binding weight must be between 0.0 and {MAX_BINDING_WEIGHT}"
        )));
    }
    Ok(())
}

fn decode_watermark(encoded: &str) -> Result<RgbaImage, CoreError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| CoreError::Validation(format!("Watermark is not valid base64: {e}")))?;
    decode_image(&bytes)
        .map_err(|e| CoreError::Validation(format!("Watermark could not be decoded: {e}")))
}

/// Parse a watermark position name.
pub fn parse_position(value: &str) -> Result<Alignment, CoreError> {
    match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "top-left" => Ok(Alignment::TopLeft),
        "top-right" => Ok(Alignment::TopRight),
        "bottom-left" => Ok(Alignment::BottomLeft),
        "bottom-right" => Ok(Alignment::BottomRight),
        "center" => Ok(Alignment::Center),
        other => Err(CoreError::Validation(format!(
            "Invalid watermark position '{other}'. Must be one of: \
             top-left, top-right, bottom-left, bottom-right, center"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Validated snapshot
// ---------------------------------------------------------------------------

/// A watermark image decoded at submission.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub image: RgbaImage,
    pub position: Alignment,
    pub opacity: f32,
}

/// Immutable generation parameters stored on the job.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub title: String,
    pub subtitle: Option<String>,
    pub client_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub visual_style: VisualStyle,
    pub steps: u32,
    pub guidance: f32,
    pub seed: Option<u64>,
    pub style_binding: Option<StyleBinding>,
    pub watermark: Option<Watermark>,
    pub size: ImageSize,
    pub workflow: Workflow,
}

impl GenerationRequest {
    /// A request with only a title, every other field at its default.
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            subtitle: None,
            client_id: None,
            custom_prompt: None,
            visual_style: VisualStyle::default(),
            steps: DEFAULT_STEPS,
            guidance: DEFAULT_GUIDANCE,
            seed: None,
            style_binding: None,
            watermark: None,
            size: DEFAULT_SIZE,
            workflow: Workflow::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::encode_png;
    use assert_matches::assert_matches;
    use image::Rgba;

    fn dto(title: &str) -> GenerateCoverRequest {
        GenerateCoverRequest {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn png_base64() -> String {
        let logo = RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255]));
        BASE64.encode(encode_png(&logo).unwrap())
    }

    #[test]
    fn minimal_request_gets_defaults() {
        let request = dto("Bitcoin Reaches New High").into_request().unwrap();
        assert_eq!(request.size, DEFAULT_SIZE);
        assert_eq!(request.steps, DEFAULT_STEPS);
        assert_eq!(request.guidance, DEFAULT_GUIDANCE);
        assert_eq!(request.visual_style, VisualStyle::Dark);
        assert_eq!(request.workflow, Workflow::Automated);
        assert!(request.watermark.is_none());
    }

    #[test]
    fn empty_and_blank_titles_rejected() {
        assert_matches!(dto("").into_request(), Err(CoreError::Validation(_)));
        assert_matches!(dto("   ").into_request(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn overlong_fields_rejected() {
        assert_matches!(dto(&"t".repeat(201)).into_request(), Err(CoreError::Validation(_)));

        let mut request = dto("ok");
        request.subtitle = Some("s".repeat(301));
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));

        let mut request = dto("ok");
        request.custom_prompt = Some("p".repeat(2001));
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn steps_and_guidance_ranges_enforced() {
        let mut request = dto("ok");
        request.steps = Some(0);
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));

        let mut request = dto("ok");
        request.guidance = Some(31.0);
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn size_parsing() {
        assert_eq!(ImageSize::parse("1920x1080").unwrap().to_string(), "1920x1080");
        assert_eq!(ImageSize::parse(" 512X512 ").unwrap(), ImageSize { width: 512, height: 512 });
        assert!(ImageSize::parse("1920x1080").unwrap().is_preset());
        assert!(!ImageSize::parse("512x256").unwrap().is_preset());
        assert_matches!(ImageSize::parse("100x100"), Err(CoreError::Validation(_)));
        assert_matches!(ImageSize::parse("5000x900"), Err(CoreError::Validation(_)));
        assert_matches!(ImageSize::parse("wide"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn watermark_is_decoded_with_position_and_opacity() {
        let mut request = dto("ok");
        request.watermark = Some(png_base64());
        request.watermark_position = Some("top_left".to_string());
        let watermark = request.into_request().unwrap().watermark.unwrap();
        assert_eq!(watermark.image.dimensions(), (8, 4));
        assert_eq!(watermark.position, Alignment::TopLeft);
        assert_eq!(watermark.opacity, DEFAULT_WATERMARK_OPACITY);
    }

    #[test]
    fn watermark_accepts_data_url() {
        let mut request = dto("ok");
        request.watermark = Some(format!("data:image/png;base64,{}", png_base64()));
        assert!(request.into_request().unwrap().watermark.is_some());
    }

    #[test]
    fn invalid_watermark_rejected() {
        let mut request = dto("ok");
        request.watermark = Some("!!!not base64!!!".to_string());
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));

        let mut request = dto("ok");
        request.watermark = Some(BASE64.encode(b"plain text"));
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn unknown_style_and_position_rejected() {
        let mut request = dto("ok");
        request.style = Some("neon".to_string());
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));

        assert_matches!(parse_position("middle"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn binding_weight_is_bounded() {
        let mut request = dto("ok");
        request.style_binding = Some(StyleBinding {
            name: "x".to_string(),
            weight: 3.0,
        });
        assert_matches!(request.into_request(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{"title": "Hello", "workflow": "manual", "size": "1920x1080"}"#;
        let request: GenerateCoverRequest = serde_json::from_str(json).unwrap();
        let request = request.into_request().unwrap();
        assert_eq!(request.workflow, Workflow::Manual);
        assert_eq!(request.size.height, 1080);
    }
}
