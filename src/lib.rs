//! # Stereocast
//!
//! Turn an uploaded 2D video into a 3D rendition, frame by frame.
//!
//! An upload is sampled down to a fixed frame rate, every sampled frame is
//! optionally sent to a remote inference endpoint for a 2D-to-3D conversion,
//! and the frames are encoded back into a single video that is published
//! either as a local static file or to cloud storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stereocast::{config::Config, pipeline::ConversionEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.apply_env();
//!
//! let engine = ConversionEngine::new(config);
//! let processed = engine.process_video("upload.mp4").await?;
//! println!("{}", processed.download_url);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Frame extraction, merging and the frame types
//! - [`transform`] - The per-frame transform (identity or remote inference)
//! - [`publish`] - Local static exposure and cloud storage upload
//! - [`pipeline`] - The engine sequencing all of the above
//! - [`upload`] - Persisting uploads and shaping the response
//! - [`config`] - Configuration management
//!
//! Remote failures never abort a run: a frame the endpoint cannot convert keeps
//! its original pixels, and a failed cloud upload falls back to the local URL.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod transform;
pub mod upload;
pub mod video;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{ConverterError, Result},
    pipeline::{ConversionEngine, ProcessedVideo},
    transform::{FailurePolicy, FrameTransform},
    video::{Frame, FrameSequence},
};
