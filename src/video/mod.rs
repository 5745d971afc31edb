//! # Video Frame Pipeline
//!
//! Decoding a container into a sampled frame sequence, and encoding a frame
//! sequence back into a single fixed-geometry container. Both directions go
//! through external `ffmpeg`/`ffprobe` processes.

pub mod types;
pub mod probe;
pub mod extractor;
pub mod merger;

pub use types::{Frame, FrameSequence, VideoMetadata};
pub use probe::{ffmpeg_available, probe_video};
pub use extractor::{sampling_interval, FfmpegSource, FrameExtractor, FrameSource};
pub use merger::{test_pattern_color, EncoderSettings, FfmpegWriter, FrameMerger, FrameSink};
