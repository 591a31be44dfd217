//! Domain types and pure logic for cover image generation.
//!
//! Everything in this crate is free of I/O: layout zones and their
//! validation, the compositor, text wrapping, style resolution, and the
//! job state machine. The pipeline and API crates wire these into the
//! asynchronous service.

pub mod compositor;
pub mod error;
pub mod font;
pub mod job;
pub mod layout;
pub mod request;
pub mod style;
pub mod text;
pub mod types;
