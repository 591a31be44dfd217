//! Layout zones: named, resolution-independent rectangles reserved for
//! titles, subtitles and branding.
//!
//! Zones are expressed in normalized coordinates (fractions of the canvas
//! width/height) so the same configuration works for every output size.
//! A [`LayoutZones`] set is validated once when it is built: names must be
//! unique and no two exclusive zones may overlap.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Zone names
// ---------------------------------------------------------------------------

/// Zone holding the article title.
pub const ZONE_TITLE: &str = "title";
/// Zone holding the article subtitle.
pub const ZONE_SUBTITLE: &str = "subtitle";
/// Zone holding the watermark / publisher logo.
pub const ZONE_WATERMARK: &str = "watermark";
/// Band where the generated artwork is expected to carry its visual interest.
pub const ZONE_CONTENT: &str = "content";

// ---------------------------------------------------------------------------
// Rectangles
// ---------------------------------------------------------------------------

/// A rectangle in normalized canvas coordinates, `0.0 <= x0 < x1 <= 1.0`
/// and `0.0 <= y0 < y1 <= 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f32; 4]", into = "[f32; 4]")]
pub struct NormalizedRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl NormalizedRect {
    /// Build a rectangle, rejecting coordinates outside `[0, 1]` and
    /// empty or inverted extents.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Result<Self, CoreError> {
        let coords = [x0, y0, x1, y1];
        if coords.iter().any(|c| !c.is_finite() || *c < 0.0 || *c > 1.0) {
            return Err(CoreError::Configuration(format!(
                "Rectangle ({x0}, {y0}, {x1}, {y1}) has coordinates outside [0, 1]"
            )));
        }
        if x0 >= x1 || y0 >= y1 {
            return Err(CoreError::Configuration(format!(
                "Rectangle ({x0}, {y0}, {x1}, {y1}) is empty or inverted"
            )));
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    /// The whole canvas.
    pub fn full() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True when the interiors intersect. Rectangles that merely share an
    /// edge do not overlap.
    pub fn overlaps(&self, other: &NormalizedRect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// Map onto a `width` x `height` canvas.
    ///
    /// Both edges are floored, so two rectangles that share a normalized
    /// edge map onto pixel rectangles that share an edge and never overlap.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let left = (self.x0 * width as f32).floor() as u32;
        let right = ((self.x1 * width as f32).floor() as u32).min(width);
        let top = (self.y0 * height as f32).floor() as u32;
        let bottom = ((self.y1 * height as f32).floor() as u32).min(height);
        PixelRect {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

impl TryFrom<[f32; 4]> for NormalizedRect {
    type Error = CoreError;

    fn try_from(value: [f32; 4]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<NormalizedRect> for [f32; 4] {
    fn from(rect: NormalizedRect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

/// A half-open pixel rectangle `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, px: i64, py: i64) -> bool {
        px >= self.x as i64
            && py >= self.y as i64
            && px < self.right() as i64
            && py < self.bottom() as i64
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Shrink by `margin` pixels on every side, never below zero size.
    pub fn inset(&self, margin: u32) -> PixelRect {
        let dx = margin.min(self.width / 2);
        let dy = margin.min(self.height / 2);
        PixelRect {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width - 2 * dx,
            height: self.height - 2 * dy,
        }
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// A named reserved region of the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutZone {
    pub name: String,
    pub bounds: NormalizedRect,
    /// Only overlay content is drawn here; the generation stage is told to
    /// keep the area visually quiet via `prompt_hint`.
    #[serde(default)]
    pub exclusive: bool,
    /// Layout constraint sentence sent to the image model for exclusive zones.
    #[serde(default)]
    pub prompt_hint: Option<String>,
}

impl LayoutZone {
    pub fn new(name: &str, bounds: NormalizedRect, exclusive: bool) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            exclusive,
            prompt_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.prompt_hint = Some(hint.to_string());
        self
    }
}

/// A validated set of layout zones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutZones {
    zones: Vec<LayoutZone>,
}

impl LayoutZones {
    /// Validate and build a zone set.
    ///
    /// Fails with [`CoreError::Configuration`] on duplicate names or when two
    /// exclusive zones overlap.
    pub fn new(zones: Vec<LayoutZone>) -> Result<Self, CoreError> {
        for (i, a) in zones.iter().enumerate() {
            if a.name.trim().is_empty() {
                return Err(CoreError::Configuration(
                    "Layout zone names must not be empty".to_string(),
                ));
            }
            for b in &zones[i + 1..] {
                if a.name == b.name {
                    return Err(CoreError::Configuration(format!(
                        "Duplicate layout zone '{}'",
                        a.name
                    )));
                }
                if a.exclusive && b.exclusive && a.bounds.overlaps(&b.bounds) {
                    return Err(CoreError::Configuration(format!(
                        "Exclusive layout zones '{}' and '{}' overlap",
                        a.name, b.name
                    )));
                }
            }
        }
        Ok(Self { zones })
    }

    /// Parse and validate a JSON array of zones.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let zones: Vec<LayoutZone> = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("Invalid layout zone file: {e}")))?;
        Self::new(zones)
    }

    /// The standard cover layout: title band at the top, subtitle below it,
    /// a watermark strip along the bottom and a free artwork band between.
    pub fn cover_default() -> Self {
        let zones = vec![
            LayoutZone::new(ZONE_TITLE, rect(0.06, 0.08, 0.94, 0.42), true)
                .with_hint("keep the top area clear and calm for a large headline"),
            LayoutZone::new(ZONE_SUBTITLE, rect(0.10, 0.44, 0.90, 0.60), true)
                .with_hint("leave extra vertical space below the headline for subtitle text"),
            LayoutZone::new(ZONE_CONTENT, rect(0.0, 0.60, 1.0, 0.80), false),
            LayoutZone::new(ZONE_WATERMARK, rect(0.0, 0.80, 1.0, 1.0), true)
                .with_hint("keep the bottom strip clear for branding"),
        ];
        // The literal rectangles above are known-valid and non-overlapping.
        Self { zones }
    }

    pub fn get(&self, name: &str) -> Option<&LayoutZone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Look up a zone that a draw operation references.
    pub fn resolve(&self, name: &str) -> Result<&LayoutZone, CoreError> {
        self.get(name).ok_or_else(|| {
            CoreError::Configuration(format!("Unknown layout zone '{name}'"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayoutZone> {
        self.zones.iter()
    }

    pub fn exclusive(&self) -> impl Iterator<Item = &LayoutZone> {
        self.zones.iter().filter(|z| z.exclusive)
    }

    /// Prompt hints of all exclusive zones, in configuration order.
    pub fn layout_constraints(&self) -> Vec<String> {
        self.exclusive()
            .filter_map(|z| z.prompt_hint.clone())
            .collect()
    }
}

fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> NormalizedRect {
    NormalizedRect { x0, y0, x1, y1 }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
