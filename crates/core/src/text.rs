//! Text measurement and deterministic line breaking.
//!
//! Titles that do not fit their zone are broken into two lines with a
//! longer first line, matching the house style of the cover artwork. If
//! the wrapped block still overflows, the font size is reduced step by
//! step until it fits or reaches [`MIN_FONT_PX`].

use image::GrayImage;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The first line must be at least this many times wider than the second.
pub const FIRST_LINE_RATIO: f32 = 1.2;

/// Smallest font size the fitting loop will shrink to.
pub const MIN_FONT_PX: f32 = 8.0;

/// Multiplier applied to the font size per fitting step.
pub const SHRINK_STEP: f32 = 0.9;

// ---------------------------------------------------------------------------
// Font face abstraction
// ---------------------------------------------------------------------------

/// A font that can measure and rasterise single lines of text.
///
/// Implementations must be deterministic: the same text at the same size
/// always yields the same width and the same coverage mask.
pub trait FontFace: Send + Sync {
    /// Horizontal advance of `text` at `px` pixels per em.
    fn text_width(&self, text: &str, px: f32) -> f32;

    /// Distance between consecutive baselines at `px`.
    fn line_height(&self, px: f32) -> f32;

    /// Rasterise `text` into a coverage mask (0 = transparent, 255 = ink)
    /// whose origin is the top-left of the line box.
    fn render_line(&self, text: &str, px: f32) -> GrayImage;
}

// ---------------------------------------------------------------------------
// Wrapping
// ---------------------------------------------------------------------------

/// Break `text` so that it fits `max_width` at `px`.
///
/// - Text that already fits is returned as a single line.
/// - Multi-word text is split at a word boundary whose first line is at
///   least [`FIRST_LINE_RATIO`] times wider than the second. When several
///   boundaries qualify, the one with the smallest width ratio wins, so the
///   two lines stay as close to balanced as the ratio allows; a boundary
///   with a larger ratio is never preferred. With no qualifying boundary,
///   the split falls just past the middle word.
/// - A single unbreakable token is split at its character midpoint.
pub fn wrap_text(face: &dyn FontFace, text: &str, px: f32, max_width: f32) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let normalized = words.join(" ");

    if normalized.is_empty() {
        return Vec::new();
    }
    if face.text_width(&normalized, px) <= max_width {
        return vec![normalized];
    }
    if words.len() < 2 {
        return split_token(&normalized);
    }

    let mut best: Option<(usize, f32)> = None;
    for i in 1..words.len() {
        let first = face.text_width(&words[..i].join(" "), px);
        let second = face.text_width(&words[i..].join(" "), px);
        if second <= 0.0 {
            continue;
        }
        let ratio = first / second;
        if ratio >= FIRST_LINE_RATIO && best.map_or(true, |(_, r)| ratio < r) {
            best = Some((i, ratio));
        }
    }

    let split = match best {
        Some((i, _)) => i,
        None => (words.len() / 2 + 1).min(words.len() - 1),
    };

    vec![words[..split].join(" "), words[split..].join(" ")]
}

fn split_token(token: &str) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 2 {
        return vec![token.to_string()];
    }
    let mid = chars.len() / 2;
    vec![
        chars[..mid].iter().collect(),
        chars[mid..].iter().collect(),
    ]
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// A wrapped text block sized to fit a box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub font_px: f32,
    pub line_height: f32,
}

impl TextBlock {
    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

/// Wrap `text` at `px`, shrinking the font until the block fits
/// `max_width` x `max_height` or the size reaches [`MIN_FONT_PX`].
pub fn fit_text(
    face: &dyn FontFace,
    text: &str,
    px: f32,
    max_width: f32,
    max_height: f32,
) -> TextBlock {
    let mut size = px.max(MIN_FONT_PX);
    loop {
        let lines = wrap_text(face, text, size, max_width);
        let line_height = face.line_height(size);
        let widest = lines
            .iter()
            .map(|l| face.text_width(l, size))
            .fold(0.0_f32, f32::max);
        let fits = widest <= max_width && lines.len() as f32 * line_height <= max_height;

        if fits || size <= MIN_FONT_PX {
            return TextBlock {
                lines,
                font_px: size,
                line_height,
            };
        }
        size = (size * SHRINK_STEP).max(MIN_FONT_PX);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
