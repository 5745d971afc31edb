use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, VideoError};
use crate::video::types::VideoMetadata;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    #[serde(default)]
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    #[serde(default)]
    rotation: Option<f64>,
}

/// Check that both `ffmpeg` and `ffprobe` can be executed
pub fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

/// Read the first video stream's geometry and native frame rate
///
/// Fails with `OpenFailed` when the container cannot be opened or holds no
/// video stream.
pub fn probe_video<P: AsRef<Path>>(path: P) -> Result<VideoMetadata> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(VideoError::open_failed(path, "file does not exist").into());
    }

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-select_streams", "v:0"])
        .arg(path)
        .output()
        .map_err(|e| VideoError::open_failed(path, format!("ffprobe could not run: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::open_failed(path, stderr.trim()).into());
    }

    let metadata = parse_probe_json(&output.stdout)
        .ok_or_else(|| VideoError::open_failed(path, "no decodable video stream"))?;

    info!(
        "Video metadata: {}x{} @ {} ({})",
        metadata.width,
        metadata.height,
        metadata.fps.map(|f| format!("{:.2}fps", f)).unwrap_or_else(|| "unknown fps".to_string()),
        metadata.codec
    );
    Ok(metadata)
}

fn parse_probe_json(json: &[u8]) -> Option<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(json).ok()?;
    let stream = probe.streams.into_iter().next()?;

    let coded_width = stream.width.filter(|w| *w > 0)?;
    let coded_height = stream.height.filter(|h| *h > 0)?;

    // ffmpeg auto-rotates on decode, so frames come out in display orientation
    let rotation = stream_rotation(&stream);
    let (width, height) = if rotation % 180 == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    let fps = guess_frame_rate(
        stream.r_frame_rate.as_deref().and_then(parse_rate),
        stream.avg_frame_rate.as_deref().and_then(parse_rate),
    );
    debug!("Probed native frame rate: {:?}, rotation: {}", fps, rotation);

    Some(VideoMetadata {
        fps,
        width,
        height,
        rotation,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Display rotation in degrees, normalized to `0..360`
///
/// Display-matrix side data wins over the legacy `rotate` tag.
fn stream_rotation(stream: &ProbeStream) -> u32 {
    let degrees = stream
        .side_data_list
        .iter()
        .find_map(|side_data| side_data.rotation)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|tags| tags.rotate.as_deref())
                .and_then(|rotate| rotate.trim().parse::<f64>().ok())
        })
        .filter(|degrees| degrees.is_finite())
        .unwrap_or(0.0);

    (degrees.round() as i64).rem_euclid(360) as u32
}

/// Pick the native frame rate the way libavformat guesses it
///
/// Variable-rate containers often report a timebase-like `r_frame_rate`
/// (e.g. `1000/1`); when it is implausibly high and the average is an
/// ordinary video rate, the average is used instead.
pub fn guess_frame_rate(r_frame_rate: Option<f64>, avg_frame_rate: Option<f64>) -> Option<f64> {
    match (r_frame_rate, avg_frame_rate) {
        (Some(r), Some(avg)) if r > 210.0 && avg < 70.0 => Some(avg),
        (Some(r), _) => Some(r),
        (None, avg) => avg,
    }
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
///
/// Zero, negative, and undefined (`0/0`) rates yield `None`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("48/1"), Some(48.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0/1"), None);
        assert_eq!(parse_rate("-5/1"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_json() {
        let json = br#"{
            "streams": [{
                "codec_name": "mpeg4",
                "width": 100,
                "height": 80,
                "r_frame_rate": "48/1",
                "avg_frame_rate": "48/1"
            }]
        }"#;

        let metadata = parse_probe_json(json).unwrap();
        assert_eq!(metadata.width, 100);
        assert_eq!(metadata.height, 80);
        assert_eq!(metadata.fps, Some(48.0));
        assert_eq!(metadata.codec, "mpeg4");
    }

    #[test]
    fn test_zero_rate_falls_back_to_average() {
        let json = br#"{"streams": [{"width": 4, "height": 4, "r_frame_rate": "0/0", "avg_frame_rate": "24/1"}]}"#;
        assert_eq!(parse_probe_json(json).unwrap().fps, Some(24.0));

        let json = br#"{"streams": [{"width": 4, "height": 4, "r_frame_rate": "0/0"}]}"#;
        assert_eq!(parse_probe_json(json).unwrap().fps, None);
    }

    #[test]
    fn test_variable_rate_container_uses_average() {
        let json = br#"{"streams": [{"width": 640, "height": 480, "r_frame_rate": "1000/1", "avg_frame_rate": "30/1"}]}"#;
        let fps = parse_probe_json(json).unwrap().fps;
        assert_eq!(fps, Some(30.0));
        assert_eq!(crate::video::sampling_interval(fps, 24.0), 1);
    }

    #[test]
    fn test_guess_frame_rate() {
        assert_eq!(guess_frame_rate(Some(1000.0), Some(30.0)), Some(30.0));
        assert_eq!(guess_frame_rate(Some(48.0), Some(47.5)), Some(48.0));
        // high rate with a high average is genuine
        assert_eq!(guess_frame_rate(Some(240.0), Some(240.0)), Some(240.0));
        assert_eq!(guess_frame_rate(Some(1000.0), None), Some(1000.0));
        assert_eq!(guess_frame_rate(None, Some(25.0)), Some(25.0));
        assert_eq!(guess_frame_rate(None, None), None);
    }

    #[test]
    fn test_rotated_stream_reports_display_geometry() {
        let json = br#"{
            "streams": [{
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30/1",
                "side_data_list": [
                    {"side_data_type": "Display Matrix", "displaymatrix": "...", "rotation": -90}
                ]
            }]
        }"#;

        let metadata = parse_probe_json(json).unwrap();
        assert_eq!(metadata.rotation, 270);
        assert_eq!((metadata.width, metadata.height), (1080, 1920));
    }

    #[test]
    fn test_legacy_rotate_tag() {
        let json = br#"{"streams": [{"width": 640, "height": 360, "tags": {"rotate": "90"}}]}"#;
        let metadata = parse_probe_json(json).unwrap();
        assert_eq!((metadata.width, metadata.height), (360, 640));

        let json = br#"{"streams": [{"width": 640, "height": 360, "tags": {"rotate": "180"}}]}"#;
        let metadata = parse_probe_json(json).unwrap();
        assert_eq!(metadata.rotation, 180);
        assert_eq!((metadata.width, metadata.height), (640, 360));
    }

    #[test]
    fn test_no_video_stream() {
        assert!(parse_probe_json(br#"{"streams": []}"#).is_none());
        assert!(parse_probe_json(br#"{}"#).is_none());
        assert!(parse_probe_json(b"garbage").is_none());
    }

    #[test]
    fn test_probe_missing_file_is_open_error() {
        let err = probe_video("/no/such/video.mp4").unwrap_err();
        assert!(err.is_fatal());
    }
}
