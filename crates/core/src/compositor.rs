//! Layout zone compositor.
//!
//! [`compose`] draws text blocks and image overlays onto a background.
//! Every element is anchored to a layout zone (or an explicit normalized
//! rectangle) and every pixel it touches, shadows included, is clipped to
//! that region. Elements anchored to two non-overlapping zones therefore
//! can never paint over each other.
//!
//! The function is pure: the same inputs always produce the same pixels.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Rgba, RgbaImage};

use crate::error::CoreError;
use crate::layout::{LayoutZones, NormalizedRect, PixelRect};
use crate::text::{fit_text, FontFace};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Canvas width the shadow offsets below are tuned for.
pub const SHADOW_REFERENCE_WIDTH: f32 = 1800.0;

/// Shadow passes as `(offset at reference width, alpha)`, drawn in order.
pub const SHADOW_LAYERS: [(f32, f32); 3] = [(6.0, 1.0), (4.0, 200.0 / 255.0), (2.0, 150.0 / 255.0)];

/// Shadow offsets are clamped into this pixel range after scaling.
pub const MIN_SHADOW_OFFSET_PX: u32 = 1;
pub const MAX_SHADOW_OFFSET_PX: u32 = 6;

const SHADOW_COLOR: [u8; 3] = [0, 0, 0];

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// Where an element is anchored.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// A named layout zone.
    Zone(String),
    /// An explicit normalized rectangle.
    Rect(NormalizedRect),
}

impl Placement {
    pub fn zone(name: &str) -> Self {
        Placement::Zone(name.to_string())
    }
}

/// Horizontal alignment of text lines inside their region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Anchor point of an image overlay inside its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// A block of text, wrapped and shrunk to fit its region, vertically centred.
#[derive(Debug, Clone)]
pub struct TextElement {
    pub content: String,
    /// Requested size in pixels; the fitting loop may shrink it.
    pub font_px: f32,
    pub color: [u8; 3],
    pub placement: Placement,
    pub align: TextAlign,
    /// Number of shadow passes, at most [`SHADOW_LAYERS`]`.len()`.
    pub shadow_passes: u8,
}

/// An image pasted with alpha blending.
#[derive(Debug, Clone)]
pub struct ImageElement {
    pub image: RgbaImage,
    /// Multiplier on the image's own alpha, `0.0..=1.0`.
    pub opacity: f32,
    pub placement: Placement,
    pub align: Alignment,
    /// Upper bound for the longer side, as a fraction of the canvas width.
    pub max_width_fraction: f32,
    /// Gap kept between the image and the region edges.
    pub margin_px: u32,
    pub shadow_passes: u8,
}

/// One draw operation.
#[derive(Debug, Clone)]
pub enum Element {
    Text(TextElement),
    Image(ImageElement),
}

impl Element {
    pub fn placement(&self) -> &Placement {
        match self {
            Element::Text(t) => &t.placement,
            Element::Image(i) => &i.placement,
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Draw `elements` over `background`.
///
/// Text elements are drawn first in the given order, then image elements
/// in the given order. Fails with [`CoreError::Configuration`] if any element
/// references an unknown zone; nothing is drawn in that case.
pub fn compose(
    background: &RgbaImage,
    elements: &[Element],
    zones: &LayoutZones,
    font: &dyn FontFace,
) -> Result<RgbaImage, CoreError> {
    let (width, height) = background.dimensions();

    let mut resolved = Vec::with_capacity(elements.len());
    for element in elements {
        let region = element_region(element.placement(), zones, width, height)?;
        resolved.push((element, region));
    }

    let mut canvas = background.clone();
    let texts = resolved
        .iter()
        .filter(|(e, _)| matches!(e, Element::Text(_)));
    let images = resolved
        .iter()
        .filter(|(e, _)| matches!(e, Element::Image(_)));

    for (element, region) in texts.chain(images) {
        if region.is_empty() {
            continue;
        }
        match element {
            Element::Text(text) => draw_text(&mut canvas, text, *region, font),
            Element::Image(overlay) => draw_image(&mut canvas, overlay, *region),
        }
    }

    Ok(canvas)
}

/// Pixel region an element anchored at `placement` may paint into.
pub fn element_region(
    placement: &Placement,
    zones: &LayoutZones,
    width: u32,
    height: u32,
) -> Result<PixelRect, CoreError> {
    let bounds = match placement {
        Placement::Zone(name) => zones.resolve(name)?.bounds,
        Placement::Rect(rect) => *rect,
    };
    Ok(bounds.to_pixels(width, height))
}

/// Shadow passes for a canvas of `canvas_width`, as `(offset_px, alpha)`.
pub fn shadow_layers(canvas_width: u32, passes: u8) -> Vec<(u32, f32)> {
    let scale = canvas_width as f32 / SHADOW_REFERENCE_WIDTH;
    SHADOW_LAYERS
        .iter()
        .take(passes as usize)
        .map(|(offset, alpha)| {
            let px = ((offset * scale).round() as u32).clamp(MIN_SHADOW_OFFSET_PX, MAX_SHADOW_OFFSET_PX);
            (px, *alpha)
        })
        .collect()
}

fn draw_text(canvas: &mut RgbaImage, text: &TextElement, region: PixelRect, font: &dyn FontFace) {
    let block = fit_text(
        font,
        &text.content,
        text.font_px,
        region.width as f32,
        region.height as f32,
    );
    let shadows = shadow_layers(canvas.width(), text.shadow_passes);
    let top = region.y as f32 + ((region.height as f32 - block.height()) / 2.0).max(0.0);

    for (i, line) in block.lines.iter().enumerate() {
        let mask = font.render_line(line, block.font_px);
        let line_width = font.text_width(line, block.font_px);
        let slack = region.width as f32 - line_width;
        let x = match text.align {
            TextAlign::Left => region.x as f32,
            TextAlign::Center => region.x as f32 + (slack / 2.0).max(0.0),
            TextAlign::Right => region.x as f32 + slack.max(0.0),
        }
        .round() as i64;
        let y = (top + i as f32 * block.line_height).round() as i64;

        for (offset, alpha) in &shadows {
            let o = *offset as i64;
            blend_mask(canvas, &mask, x + o, y + o, SHADOW_COLOR, *alpha, region);
        }
        blend_mask(canvas, &mask, x, y, text.color, 1.0, region);
    }
}

fn draw_image(canvas: &mut RgbaImage, overlay: &ImageElement, region: PixelRect) {
    let area = region.inset(overlay.margin_px);
    if area.is_empty() || overlay.image.width() == 0 || overlay.image.height() == 0 {
        return;
    }

    let (src_w, src_h) = overlay.image.dimensions();
    let longest_allowed = (canvas.width() as f32 * overlay.max_width_fraction).floor().max(1.0);
    let scale = 1.0_f32
        .min(longest_allowed / src_w.max(src_h) as f32)
        .min(area.width as f32 / src_w as f32)
        .min(area.height as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).floor() as u32).max(1);
    let new_h = ((src_h as f32 * scale).floor() as u32).max(1);

    let scaled = if (new_w, new_h) == (src_w, src_h) {
        overlay.image.clone()
    } else {
        imageops::resize(&overlay.image, new_w, new_h, FilterType::Lanczos3)
    };

    let (x, y) = match overlay.align {
        Alignment::TopLeft => (area.x, area.y),
        Alignment::TopRight => (area.right() - new_w, area.y),
        Alignment::BottomLeft => (area.x, area.bottom() - new_h),
        Alignment::BottomRight => (area.right() - new_w, area.bottom() - new_h),
        Alignment::Center => (
            area.x + (area.width - new_w) / 2,
            area.y + (area.height - new_h) / 2,
        ),
    };
    let (x, y) = (x as i64, y as i64);
    let opacity = overlay.opacity.clamp(0.0, 1.0);

    let silhouette = GrayImage::from_fn(new_w, new_h, |px, py| {
        image::Luma([scaled.get_pixel(px, py).0[3]])
    });
    for (offset, alpha) in shadow_layers(canvas.width(), overlay.shadow_passes) {
        let o = offset as i64;
        blend_mask(canvas, &silhouette, x + o, y + o, SHADOW_COLOR, alpha * opacity, region);
    }

    for (px, py, pixel) in scaled.enumerate_pixels() {
        let cx = x + px as i64;
        let cy = y + py as i64;
        if !region.contains(cx, cy) {
            continue;
        }
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0 * opacity;
        blend(canvas.get_pixel_mut(cx as u32, cy as u32), [r, g, b], alpha);
    }
}

/// Paint `color` through a coverage mask placed at `(x, y)`, clipped to `clip`.
fn blend_mask(
    canvas: &mut RgbaImage,
    mask: &GrayImage,
    x: i64,
    y: i64,
    color: [u8; 3],
    alpha: f32,
    clip: PixelRect,
) {
    for (mx, my, coverage) in mask.enumerate_pixels() {
        let c = coverage.0[0];
        if c == 0 {
            continue;
        }
        let cx = x + mx as i64;
        let cy = y + my as i64;
        if !clip.contains(cx, cy) {
            continue;
        }
        blend(
            canvas.get_pixel_mut(cx as u32, cy as u32),
            color,
            c as f32 / 255.0 * alpha,
        );
    }
}

/// Source-over blend of an opaque colour at `alpha` onto `dst`.
fn blend(dst: &mut Rgba<u8>, src: [u8; 3], alpha: f32) {
    let a = alpha.clamp(0.0, 1.0);
    if a == 0.0 {
        return;
    }
    for (channel, value) in src.iter().enumerate() {
        let mixed = *value as f32 * a + dst.0[channel] as f32 * (1.0 - a);
        dst.0[channel] = mixed.round() as u8;
    }
    let out_alpha = 255.0 * a + dst.0[3] as f32 * (1.0 - a);
    dst.0[3] = out_alpha.round() as u8;
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Decode PNG/JPEG/WebP bytes into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, CoreError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| CoreError::Validation(format!("Unreadable image: {e}")))?;
    Ok(decoded.to_rgba8())
}

/// Encode an RGBA image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CoreError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| CoreError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buffer.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
