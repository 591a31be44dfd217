//! Background image synthesis.
//!
//! [`ImageSynthesizer`] is the boundary the generation pipeline calls.
//! Two backends implement it: [`ComfyUISynthesizer`] drives a ComfyUI
//! server over its REST API, and [`GradientSynthesizer`] paints a
//! deterministic gradient for local development and tests.

pub mod api;
pub mod client;
pub mod gradient;
pub mod synthesizer;
pub mod workflow;

pub use client::{ComfyUIConfig, ComfyUISynthesizer};
pub use gradient::GradientSynthesizer;
pub use synthesizer::{ImageSynthesizer, SynthesisError, SynthesisRequest};
