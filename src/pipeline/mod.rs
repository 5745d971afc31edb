//! # Conversion Pipeline
//!
//! Sequences extraction, per-frame transformation, merging and publishing for
//! one uploaded video.

pub mod engine;

pub use engine::{ConversionEngine, ProcessedVideo, RenderOutcome};
