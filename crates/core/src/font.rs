//! Font faces for the compositor.
//!
//! [`TrueTypeFont`] renders real glyph outlines from a TTF/OTF file.
//! [`BlockFont`] is a dependency-free fallback used when no font file is
//! configured: every glyph is a solid cell with a fixed advance, which keeps
//! layout predictable (and is what the unit tests measure against).

use std::path::Path;

use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use image::{GrayImage, Luma};

use crate::error::CoreError;
use crate::text::FontFace;

// ---------------------------------------------------------------------------
// BlockFont
// ---------------------------------------------------------------------------

/// Advance of a visible glyph, in ems.
const BLOCK_GLYPH_ADVANCE: f32 = 0.625;
/// Advance of a whitespace character, in ems.
const BLOCK_SPACE_ADVANCE: f32 = 0.3125;
/// Baseline-to-baseline distance, in ems.
const BLOCK_LINE_HEIGHT: f32 = 1.25;

/// Fixed-advance face drawing each glyph as a filled cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFont;

impl BlockFont {
    fn advance(c: char, px: f32) -> f32 {
        if c.is_whitespace() {
            BLOCK_SPACE_ADVANCE * px
        } else {
            BLOCK_GLYPH_ADVANCE * px
        }
    }
}

impl FontFace for BlockFont {
    fn text_width(&self, text: &str, px: f32) -> f32 {
        text.chars().map(|c| Self::advance(c, px)).sum()
    }

    fn line_height(&self, px: f32) -> f32 {
        BLOCK_LINE_HEIGHT * px
    }

    fn render_line(&self, text: &str, px: f32) -> GrayImage {
        let width = self.text_width(text, px).ceil().max(1.0) as u32;
        let height = self.line_height(px).ceil().max(1.0) as u32;
        let mut mask = GrayImage::new(width, height);

        let top = (0.2 * height as f32) as u32;
        let bottom = ((0.85 * height as f32) as u32).min(height);
        let mut caret = 0.0_f32;
        for c in text.chars() {
            let advance = Self::advance(c, px);
            if !c.is_whitespace() {
                let left = (caret + 0.08 * px) as u32;
                let right = ((caret + 0.52 * px) as u32).min(width);
                for y in top..bottom {
                    for x in left..right {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
            }
            caret += advance;
        }
        mask
    }
}

// ---------------------------------------------------------------------------
// TrueTypeFont
// ---------------------------------------------------------------------------

/// A TrueType/OpenType font loaded into memory.
pub struct TrueTypeFont {
    font: FontVec,
}

impl TrueTypeFont {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CoreError> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| CoreError::Configuration(format!("Invalid font data: {e}")))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CoreError::Configuration(format!("Cannot read font '{}': {e}", path.display()))
        })?;
        Self::from_bytes(bytes)
    }

    /// Walk the glyphs of `text`, yielding each glyph id with its pen x.
    fn layout(&self, text: &str, px: f32) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut caret = 0.0_f32;
        let mut previous: Option<GlyphId> = None;
        let mut glyphs = Vec::with_capacity(text.len());

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, id);
            }
            glyphs.push((id, caret));
            caret += scaled.h_advance(id);
            previous = Some(id);
        }
        (glyphs, caret)
    }
}

impl FontFace for TrueTypeFont {
    fn text_width(&self, text: &str, px: f32) -> f32 {
        self.layout(text, px).1
    }

    fn line_height(&self, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        scaled.height() + scaled.line_gap()
    }

    fn render_line(&self, text: &str, px: f32) -> GrayImage {
        let scale = PxScale::from(px);
        let ascent = self.font.as_scaled(scale).ascent();
        let (glyphs, advance) = self.layout(text, px);

        let width = advance.ceil().max(1.0) as u32 + 1;
        let height = self.line_height(px).ceil().max(1.0) as u32;
        let mut mask = GrayImage::new(width, height);

        for (id, x) in glyphs {
            let glyph = id.with_scale_and_position(scale, point(x, ascent));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px_x = bounds.min.x as i64 + gx as i64;
                let px_y = bounds.min.y as i64 + gy as i64;
                if px_x < 0 || px_y < 0 || px_x >= width as i64 || px_y >= height as i64 {
                    return;
                }
                let value = (coverage * 255.0).round().clamp(0.0, 255.0) as u8;
                let pixel = mask.get_pixel_mut(px_x as u32, px_y as u32);
                pixel.0[0] = pixel.0[0].max(value);
            });
        }
        mask
    }
}
