//! Offline synthesizer painting a seeded gradient with a few outlined tiles.
//!
//! Output depends only on the request seed and size, so it is suitable for
//! development without a model server and for deterministic tests.

use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::synthesizer::{ImageSynthesizer, SynthesisError, SynthesisRequest};

/// Top and bottom colours of the available gradients.
const PALETTES: [([u8; 3], [u8; 3]); 6] = [
    ([10, 20, 40], [30, 60, 120]),
    ([0, 30, 60], [0, 100, 200]),
    ([80, 0, 80], [160, 0, 160]),
    ([20, 20, 80], [60, 60, 160]),
    ([40, 80, 120], [80, 160, 240]),
    ([20, 20, 20], [80, 80, 80]),
];

const TILE_COUNT: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct GradientSynthesizer {
    latency: Duration,
}

impl GradientSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before returning, to mimic model latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Paint the image for `request` synchronously.
    pub fn render(request: &SynthesisRequest) -> RgbaImage {
        let mut rng = StdRng::seed_from_u64(request.seed);
        let (top, bottom) = PALETTES[rng.random_range(0..PALETTES.len())];
        let (width, height) = (request.width.max(1), request.height.max(1));

        let mut image = RgbaImage::from_fn(width, height, |_, y| {
            let t = y as f32 / height as f32;
            let mix = |a: u8, b: u8| (a as f32 * (1.0 - t) + b as f32 * t) as u8;
            Rgba([mix(top[0], bottom[0]), mix(top[1], bottom[1]), mix(top[2], bottom[2]), 255])
        });

        // Outlined tiles in the middle band, where the layout keeps artwork.
        let accent = Rgba([bottom[0], bottom[1], bottom[2], 255]);
        let band_top = height * 6 / 10;
        let band_height = (height / 5).max(1);
        for i in 0..TILE_COUNT {
            let size = (width / 30).max(4) - i as u32 * (width / 150).min(3);
            let x = rng.random_range(0..width.saturating_sub(size).max(1));
            let y = band_top + rng.random_range(0..band_height.saturating_sub(size).max(1));
            outline(&mut image, x, y, size, accent);
        }

        image
    }
}

fn outline(image: &mut RgbaImage, x: u32, y: u32, size: u32, color: Rgba<u8>) {
    let (w, h) = image.dimensions();
    for dx in 0..size {
        for dy in 0..size {
            let edge = dx < 2 || dy < 2 || dx + 2 >= size || dy + 2 >= size;
            if edge && x + dx < w && y + dy < h {
                image.put_pixel(x + dx, y + dy, color);
            }
        }
    }
}

#[async_trait]
impl ImageSynthesizer for GradientSynthesizer {
    fn name(&self) -> &'static str {
        "gradient"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RgbaImage, SynthesisError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        tracing::debug!(seed = request.seed, width = request.width, height = request.height, "Painting gradient background");
        Ok(Self::render(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seed: u64) -> SynthesisRequest {
        SynthesisRequest {
            prompt: "anything".into(),
            negative_prompt: String::new(),
            width: 640,
            height: 320,
            style_binding: None,
            steps: 30,
            guidance: 7.5,
            seed,
        }
    }

    #[tokio::test]
    async fn output_has_requested_size() {
        let image = GradientSynthesizer::new().synthesize(&request(1)).await.unwrap();
        assert_eq!(image.dimensions(), (640, 320));
    }

    #[test]
    fn same_seed_same_pixels() {
        assert_eq!(GradientSynthesizer::render(&request(7)), GradientSynthesizer::render(&request(7)));
    }

    #[test]
    fn tiny_canvas_does_not_panic() {
        let mut req = request(3);
        req.width = 1;
        req.height = 1;
        assert_eq!(GradientSynthesizer::render(&req).dimensions(), (1, 1));
    }
}
