use std::path::{Path, PathBuf};

use tokio::task;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{ConverterError, Result, VideoError},
    publish::Publisher,
    transform::{FrameTransform, TransformStats},
    video::{EncoderSettings, FrameExtractor, FrameMerger, FrameSequence},
};

/// Result of the frame pipeline for one upload
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    pub frames_written: usize,
    pub stats: TransformStats,
}

/// Result of a full run, including publishing
#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    pub download_url: String,
    pub render: RenderOutcome,
}

/// Main conversion engine that drives one upload through the pipeline
///
/// The engine follows a fixed sequence with no branching:
/// 1. Extraction - Decode the upload and sample it to the target rate
/// 2. Transformation - Pass every frame through the configured transform
/// 3. Merging - Encode the frames into the output container
/// 4. Publishing - Hand the output to local or cloud publishing
///
/// Only unreadable containers and empty frame sequences abort a run.
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    config: Config,
    transform: FrameTransform,
    publisher: Publisher,
    merger: FrameMerger,
}

impl ConversionEngine {
    /// Create an engine whose capabilities are resolved from `config`
    pub fn new(config: Config) -> Self {
        let transform = FrameTransform::from_config(&config.inference);
        let publisher = Publisher::from_config(&config);
        let merger = FrameMerger::new(EncoderSettings {
            codec: config.pipeline.codec.clone(),
            codec_tag: config.pipeline.codec_tag.clone(),
        });

        Self { config, transform, publisher, merger }
    }

    /// Run the whole pipeline for the video at `video_path` and return its URL
    ///
    /// The blocking work runs on tokio's blocking pool; frames are still
    /// processed strictly one after another.
    pub async fn process_video<P: AsRef<Path>>(&self, video_path: P) -> Result<ProcessedVideo> {
        let engine = self.clone();
        let video_path = video_path.as_ref().to_path_buf();

        task::spawn_blocking(move || engine.process_video_blocking(&video_path))
            .await
            .map_err(|e| ConverterError::generic(format!("pipeline task failed: {}", e)))?
    }

    /// Synchronous form of [`process_video`](Self::process_video)
    pub fn process_video_blocking(&self, video_path: &Path) -> Result<ProcessedVideo> {
        info!("🎬 Starting conversion of {:?}", video_path);

        let render = self.render(video_path)?;
        let download_url = self.publish_output(&render.output_path);

        info!("🎉 Conversion complete: {}", download_url);
        Ok(ProcessedVideo { download_url, render })
    }

    /// Extract, transform and merge; publishing is left to the caller
    pub fn render(&self, video_path: &Path) -> Result<RenderOutcome> {
        let frames = self.extract_frames(video_path)?;
        self.render_frames(frames)
    }

    /// Transform and merge an already extracted sequence
    pub fn render_frames(&self, frames: FrameSequence) -> Result<RenderOutcome> {
        if frames.is_empty() {
            return Err(VideoError::EmptyInput.into());
        }

        let (frames, stats) = self.transform_frames(frames)?;
        let frames_written = frames.len();
        let output_path = self.merge_frames(frames)?;

        Ok(RenderOutcome { output_path, frames_written, stats })
    }

    // ==========================================
    // STEP 1: EXTRACTION
    // ==========================================

    fn extract_frames(&self, video_path: &Path) -> Result<FrameSequence> {
        let target_fps = self.config.pipeline.target_fps;
        info!("📹 Step 1: Extracting frames at {}fps...", target_fps);

        let frames = FrameExtractor::extract(video_path, target_fps)?;
        if frames.is_empty() {
            return Err(VideoError::EmptyInput.into());
        }

        if let Some((width, height)) = frames.canonical_dimensions() {
            info!("   ✅ {} frames, {}x{}", frames.len(), width, height);
        }
        Ok(frames)
    }

    // ==========================================
    // STEP 2: TRANSFORMATION
    // ==========================================

    fn transform_frames(&self, frames: FrameSequence) -> Result<(FrameSequence, TransformStats)> {
        if self.transform.is_identity() {
            debug!("🎨 Step 2: No inference configured, frames pass through");
        } else {
            info!("🎨 Step 2: Sending {} frames to inference...", frames.len());
        }
        self.transform.apply_all(frames)
    }

    // ==========================================
    // STEP 3: MERGING
    // ==========================================

    fn merge_frames(&self, frames: FrameSequence) -> Result<PathBuf> {
        let output_path = self.config.pipeline.output_path();
        let fps = self.config.pipeline.output_fps;
        info!("🎞️  Step 3: Merging {} frames into {:?}...", frames.len(), output_path);

        self.merger.merge(frames, &output_path, fps)
    }

    // ==========================================
    // STEP 4: PUBLISHING
    // ==========================================

    fn publish_output(&self, output_path: &Path) -> String {
        info!("☁️  Step 4: Publishing output...");
        self.publisher.publish(output_path)
    }
}
