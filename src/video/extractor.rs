use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::probe::probe_video;
use crate::video::types::{Frame, FrameSequence, VideoMetadata};

/// Sequential supply of decoded frames from one container
pub trait FrameSource {
    /// Native frame rate as reported by the container, if any
    fn native_fps(&self) -> Option<f64>;

    /// Next frame in decode order, or `None` once the container is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Stride between kept source frames when downsampling to `target_fps`
///
/// A missing or non-positive native rate counts as equal to the target.
/// Never below 1, so a target at or above the native rate keeps every frame.
/// Ties round to even (60fps -> 24fps keeps every 2nd frame).
pub fn sampling_interval(native_fps: Option<f64>, target_fps: f64) -> usize {
    if !(target_fps.is_finite() && target_fps > 0.0) {
        return 1;
    }
    let native = native_fps
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(target_fps);

    ((native / target_fps).round_ties_even() as usize).max(1)
}

/// Decodes a container through an `ffmpeg` rawvideo pipe
///
/// The child process is the decode handle; it is killed and reaped when the
/// source is dropped, whether or not the stream was read to the end.
pub struct FfmpegSource {
    path: PathBuf,
    metadata: VideoMetadata,
    child: Child,
    reader: BufReader<ChildStdout>,
    frame_len: usize,
    frames_read: usize,
    exhausted: bool,
}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = probe_video(path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0",
                "-fps_mode", "passthrough",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::open_failed(path, format!("ffmpeg could not run: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VideoError::open_failed(path, "ffmpeg stdout not available").into());
            }
        };

        let frame_len = metadata.width as usize * metadata.height as usize * 3;
        debug!("Decoding {:?} as {} byte rgb24 frames", path, frame_len);

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            child,
            reader: BufReader::new(stdout),
            frame_len,
            frames_read: 0,
            exhausted: false,
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.exhausted = true;
        match self.child.wait() {
            Ok(status) => check_decoder_exit(&self.path, self.frames_read, status),
            Err(e) => {
                warn!("Could not reap ffmpeg decoder: {}", e);
                Ok(())
            }
        }
    }
}

/// Interpret the decoder's exit once its output is exhausted
///
/// A decoder that fails before yielding a single frame means the container
/// cannot be decoded at all. Failing later only truncates the sequence.
fn check_decoder_exit(path: &Path, frames_read: usize, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    if frames_read == 0 {
        return Err(VideoError::open_failed(path, format!("ffmpeg could not decode the video stream ({})", status)).into());
    }

    warn!("ffmpeg exited with {} after {} frames of {:?}", status, frames_read, path);
    Ok(())
}

impl FrameSource for FfmpegSource {
    fn native_fps(&self) -> Option<f64> {
        self.metadata.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.frame_len];
        let filled = fill_buffer(&mut self.reader, &mut buffer).map_err(|e| VideoError::DecodingFailed {
            reason: format!("reading frame {}: {}", self.frames_read, e),
        })?;

        if filled < self.frame_len {
            if filled > 0 {
                warn!("Dropping truncated trailing frame ({} of {} bytes)", filled, self.frame_len);
            }
            self.finish()?;
            return Ok(None);
        }

        let frame = Frame::from_rgb_bytes(self.metadata.width, self.metadata.height, buffer)
            .ok_or_else(|| VideoError::DecodingFailed {
                reason: format!("frame {} has the wrong size", self.frames_read),
            })?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.exhausted {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Read until `buffer` is full or the stream ends; returns bytes read
fn fill_buffer<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Time-subsamples a video into an ordered frame sequence
pub struct FrameExtractor;

impl FrameExtractor {
    /// Decode `path` and keep every Nth frame to approximate `target_fps`
    ///
    /// An empty result is returned as-is; callers must treat it as a failure.
    pub fn extract<P: AsRef<Path>>(path: P, target_fps: u32) -> Result<FrameSequence> {
        let path = path.as_ref();
        let mut source = FfmpegSource::open(path)?;
        let frames = Self::extract_from(&mut source, target_fps)?;

        if frames.is_empty() {
            warn!("No frames extracted from {:?}", path);
        }
        Ok(frames)
    }

    /// Sample an already opened source
    pub fn extract_from<S: FrameSource + ?Sized>(source: &mut S, target_fps: u32) -> Result<FrameSequence> {
        if target_fps == 0 {
            return Err(VideoError::InvalidParameters {
                details: "target fps must be positive".to_string(),
            }.into());
        }

        let interval = sampling_interval(source.native_fps(), target_fps as f64);
        debug!(
            "Sampling interval {} (native {:?}, target {}fps)",
            interval, source.native_fps(), target_fps
        );

        let mut frames = FrameSequence::new();
        let mut index = 0usize;
        while let Some(frame) = source.next_frame()? {
            if index % interval == 0 {
                frames.push(frame);
            }
            index += 1;
        }

        info!("Extracted {} of {} decoded frames", frames.len(), index);
        Ok(frames)
    }
}
