//! # Frame Transformation
//!
//! The per-frame 2D-to-3D hook. A run resolves its capability once from
//! configuration: either frames pass through untouched, or each one goes to
//! the remote inference endpoint.
//!
//! Exactly one output frame is produced per input frame, in input order.
//! Remote failures are governed by [`FailurePolicy`]; under the default
//! fail-open policy a failed frame keeps its original pixels and the run
//! carries on.

pub mod inference;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::InferenceConfig,
    error::Result,
    video::types::{Frame, FrameSequence},
};

pub use inference::{decode_prediction, InferenceClient};

/// What a failed remote transform does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the untransformed frame and continue
    #[default]
    FailOpen,
    /// Abort the run with the transform error
    FailClosed,
}

/// Per-run frame transformation capability
#[derive(Debug, Clone, Default)]
pub enum FrameTransform {
    #[default]
    Identity,
    RemoteInference {
        client: InferenceClient,
        policy: FailurePolicy,
    },
}

/// Outcome counts for one pass over a sequence
///
/// `fell_back` counts frames that kept their original pixels after a remote failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub frames: usize,
    pub transformed: usize,
    pub fell_back: usize,
}

impl FrameTransform {
    /// Identity unless inference is enabled
    pub fn from_config(config: &InferenceConfig) -> Self {
        if !config.enabled {
            return Self::Identity;
        }

        let client = InferenceClient::from_config(config);
        if client.predict_url().is_none() {
            warn!("Inference enabled but endpoint is not addressable; frames will pass through");
        }
        Self::RemoteInference {
            client,
            policy: config.failure_policy,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Transform one frame
    ///
    /// Returns the frame and whether it was actually transformed.
    pub fn apply(&self, frame: Frame, index: usize) -> Result<(Frame, bool)> {
        match self {
            Self::Identity => Ok((frame, false)),
            Self::RemoteInference { client, policy } => match client.predict(&frame) {
                Ok(output) => Ok((output, true)),
                Err(e) if *policy == FailurePolicy::FailOpen => {
                    warn!("Frame {} kept untransformed: {}", index, e);
                    Ok((frame, false))
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Transform every frame in order
    pub fn apply_all(&self, frames: FrameSequence) -> Result<(FrameSequence, TransformStats)> {
        let mut stats = TransformStats::default();
        let mut output = FrameSequence::with_capacity(frames.len());

        for (index, frame) in frames.into_iter().enumerate() {
            let (frame, transformed) = self.apply(frame, index)?;
            stats.frames += 1;
            if transformed {
                stats.transformed += 1;
            } else if !self.is_identity() {
                stats.fell_back += 1;
            }
            output.push(frame);
        }

        if !self.is_identity() {
            info!(
                "Transformed {}/{} frames ({} kept original)",
                stats.transformed, stats.frames, stats.fell_back
            );
        }
        Ok((output, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    fn sample_frames() -> FrameSequence {
        (0..4u8)
            .map(|i| {
                let mut frame = Frame::new_filled(6, 4, [i * 10, 50, 90]);
                frame.set_pixel(i as u32, 1, [255, 255, 255]);
                frame
            })
            .collect()
    }

    fn unreachable_config(policy: FailurePolicy) -> InferenceConfig {
        InferenceConfig {
            enabled: true,
            endpoint: Some("projects/p/locations/l/endpoints/1".into()),
            // nothing listens on port 1
            api_base: Some("http://127.0.0.1:1".into()),
            timeout_secs: 5,
            failure_policy: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_config_is_identity() {
        assert!(FrameTransform::from_config(&InferenceConfig::default()).is_identity());
    }

    #[test]
    fn test_identity_is_idempotent() {
        let transform = FrameTransform::Identity;
        let frames = sample_frames();

        let (once, stats) = transform.apply_all(frames.clone()).unwrap();
        let (twice, _) = transform.apply_all(once.clone()).unwrap();

        assert_eq!(once, frames);
        assert_eq!(twice, once);
        assert_eq!(stats, TransformStats { frames: 4, transformed: 0, fell_back: 0 });
    }

    #[test]
    fn test_fail_open_keeps_originals() {
        let transform = FrameTransform::from_config(&unreachable_config(FailurePolicy::FailOpen));
        let frames = sample_frames();

        let (output, stats) = transform.apply_all(frames.clone()).unwrap();

        assert_eq!(output, frames);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.fell_back, 4);
        assert_eq!(stats.transformed, 0);
    }

    #[test]
    fn test_fail_closed_aborts() {
        let transform = FrameTransform::from_config(&unreachable_config(FailurePolicy::FailClosed));
        assert!(transform.apply_all(sample_frames()).is_err());
    }

    #[test]
    fn test_unaddressable_endpoint_falls_back() {
        let config = InferenceConfig {
            enabled: true,
            ..Default::default()
        };
        let transform = FrameTransform::from_config(&config);
        assert!(!transform.is_identity());

        let (output, stats) = transform.apply_all(sample_frames()).unwrap();
        assert_eq!(output, sample_frames());
        assert_eq!(stats.fell_back, 4);
    }

    #[test]
    fn test_partial_failures_preserve_order_and_count() {
        // every other request fails
        let server = StubServer::spawn(|request| {
            let content = request.json["instances"][0]["content"].as_str().unwrap_or_default();
            let input = Frame::from_encoded_bytes(&STANDARD.decode(content).unwrap()).unwrap();
            let shade = input.get_pixel(5, 3)[0];
            if (shade / 10) % 2 == 1 {
                return (503, "{}".to_string());
            }
            let output = Frame::new_filled(3, 2, [shade, 0, 0]);
            let encoded = STANDARD.encode(output.to_png_bytes().unwrap());
            (200, json!({ "predictions": [encoded] }).to_string())
        });

        let config = InferenceConfig {
            api_base: Some(server.url()),
            ..unreachable_config(FailurePolicy::FailOpen)
        };
        let transform = FrameTransform::from_config(&config);
        let frames = sample_frames();

        let (output, stats) = transform.apply_all(frames.clone()).unwrap();

        assert_eq!(output.len(), 4);
        assert_eq!(stats, TransformStats { frames: 4, transformed: 2, fell_back: 2 });
        assert_eq!(output.frames()[0].dimensions(), (3, 2));
        assert_eq!(output.frames()[1], frames.frames()[1]);
        assert_eq!(output.frames()[2].get_pixel(0, 0), [20, 0, 0]);
        assert_eq!(output.frames()[3], frames.frames()[3]);
        assert_eq!(server.hits(), 4);
    }

    #[test]
    fn test_policy_serializes_snake_case() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            policy: FailurePolicy,
        }
        let text = toml::to_string(&Wrapper { policy: FailurePolicy::FailClosed }).unwrap();
        assert!(text.contains("fail_closed"));
        let parsed: Wrapper = toml::from_str("policy = \"fail_open\"").unwrap();
        assert_eq!(parsed.policy, FailurePolicy::FailOpen);
    }
}
