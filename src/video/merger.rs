use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, FrameSequence};

/// Ordered destination for encoded frames
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Commit everything written so far; the output is complete once this returns
    fn finish(&mut self) -> Result<()>;
}

/// Encoder settings for the output container
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// ffmpeg encoder name
    pub codec: String,
    /// Four-character code written into the container
    pub codec_tag: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "mpeg4".to_string(),
            codec_tag: "mp4v".to_string(),
        }
    }
}

/// Encodes rgb24 frames by piping them into an `ffmpeg` child
///
/// The child is the encode handle and writes to a sibling partial file.
/// `finish` closes its stdin, waits for the container and renames it over the
/// target path. A failed or dropped writer kills the child and discards the
/// partial file, leaving any previous output untouched.
pub struct FfmpegWriter {
    path: PathBuf,
    partial: PathBuf,
    dimensions: (u32, u32),
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames_written: usize,
    finished: bool,
}

impl FfmpegWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        fps: u32,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)
                .map_err(|e| VideoError::open_failed(path, format!("cannot create directory: {}", e)))?;
        }
        // Surface unwritable paths before any frame is encoded
        let partial = partial_path(path);
        File::create(&partial).map_err(|e| VideoError::open_failed(path, e.to_string()))?;

        let size = format!("{}x{}", width, height);
        let rate = fps.to_string();

        let child = Command::new("ffmpeg")
            .args(["-nostdin", "-y", "-v", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size, "-r", &rate, "-i", "pipe:0"])
            .args(["-an", "-c:v", &settings.codec, "-tag:v", &settings.codec_tag])
            .args(["-q:v", "2", "-pix_fmt", "yuv420p", "-r", &rate])
            .arg(&partial)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(VideoError::open_failed(path, format!("ffmpeg could not run: {}", e)).into());
            }
        };

        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut log = String::new();
                let _ = stderr.read_to_string(&mut log);
                log
            })
        });

        debug!("Opened encoder for {:?}: {} @ {}fps, {}", path, size, fps, settings.codec);

        Ok(Self {
            path: path.to_path_buf(),
            partial,
            dimensions: (width, height),
            child,
            stdin,
            stderr,
            frames_written: 0,
            finished: false,
        })
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.finished = true;
        let _ = fs::remove_file(&self.partial);
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|log| log.trim().to_string())
            .unwrap_or_default()
    }
}

impl FrameSink for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.dimensions {
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "frame is {:?}, encoder expects {:?}",
                    frame.dimensions(),
                    self.dimensions
                ),
            }.into());
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| VideoError::EncodingFailed {
            reason: "encoder already finished".to_string(),
        })?;

        if let Err(e) = stdin.write_all(frame.as_rgb_bytes()) {
            self.abort();
            let log = self.collect_stderr();
            return Err(VideoError::EncodingFailed {
                reason: format!("writing frame {}: {} {}", self.frames_written, e, log),
            }.into());
        }

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        // EOF on stdin lets ffmpeg flush and write the container trailer
        drop(self.stdin.take());
        let status = self.child.wait().map_err(|e| VideoError::EncodingFailed {
            reason: format!("waiting for ffmpeg: {}", e),
        })?;
        self.finished = true;

        let log = self.collect_stderr();
        if !status.success() {
            let _ = fs::remove_file(&self.partial);
            return Err(VideoError::EncodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, log),
            }.into());
        }
        if !log.is_empty() {
            warn!("ffmpeg encoder output for {:?}: {}", self.path, log);
        }

        fs::rename(&self.partial, &self.path).map_err(|e| {
            let _ = fs::remove_file(&self.partial);
            VideoError::open_failed(&self.path, format!("cannot replace output: {}", e))
        })?;
        debug!("Wrote {} frames to {:?}", self.frames_written, self.path);
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.abort();
        }
    }
}

/// `static/output.mp4` -> `static/output.partial.mp4`
///
/// The extension is kept last so ffmpeg still picks the container from it.
fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    path.with_file_name(name)
}

/// Writes frame sequences into a single fixed-geometry container
#[derive(Debug, Clone, Default)]
pub struct FrameMerger {
    settings: EncoderSettings,
}

impl FrameMerger {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    /// Encode `frames` into `output_path` at `fps`
    ///
    /// The first frame's geometry is used for the whole container; other frames
    /// are stretched to match. Empty input fails before any file is touched.
    pub fn merge<P: AsRef<Path>>(&self, frames: FrameSequence, output_path: P, fps: u32) -> Result<PathBuf> {
        let output_path = output_path.as_ref();

        let (width, height) = frames.canonical_dimensions().ok_or(VideoError::EmptyInput)?;
        if fps == 0 {
            return Err(VideoError::InvalidParameters {
                details: "output fps must be positive".to_string(),
            }.into());
        }

        let mut writer = FfmpegWriter::create(output_path, width, height, fps, &self.settings)?;
        let written = Self::merge_into(frames, &mut writer)?;

        info!("Merged {} frames ({}x{} @ {}fps) into {:?}", written, width, height, fps, output_path);
        Ok(output_path.to_path_buf())
    }

    /// Normalize every frame to the first frame's geometry and write it to `sink`
    ///
    /// Returns the number of frames written.
    pub fn merge_into<S: FrameSink + ?Sized>(frames: FrameSequence, sink: &mut S) -> Result<usize> {
        let (width, height) = frames.canonical_dimensions().ok_or(VideoError::EmptyInput)?;

        let mut written = 0;
        for (index, frame) in frames.into_iter().enumerate() {
            let frame = if frame.dimensions() != (width, height) {
                debug!("Resizing frame {} from {:?} to {}x{}", index, frame.dimensions(), width, height);
                frame.resized(width, height)
            } else {
                frame
            };
            sink.write_frame(&frame)?;
            written += 1;
        }

        sink.finish()?;
        Ok(written)
    }

    /// Write a synthetic clip whose frames step through the hue wheel
    ///
    /// Frame `i` is a solid [`test_pattern_color`]`(i, frame_count)`.
    pub fn create_test_video<P: AsRef<Path>>(
        &self,
        output_path: P,
        duration_seconds: f64,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<PathBuf> {
        let frame_count = (duration_seconds * fps as f64).round() as usize;
        let frames: FrameSequence = (0..frame_count)
            .map(|i| Frame::new_filled(width, height, test_pattern_color(i, frame_count)))
            .collect();

        self.merge(frames, output_path, fps)
    }
}

/// Solid color of frame `index` in a clip of `frame_count` test frames
pub fn test_pattern_color(index: usize, frame_count: usize) -> [u8; 3] {
    let hue = (index as f32 / frame_count.max(1) as f32) * 360.0;
    hsv_to_rgb(hue, 0.7, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}
