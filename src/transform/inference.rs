use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::debug;
use ureq::Agent;

use crate::config::InferenceConfig;
use crate::error::TransformError;
use crate::video::types::Frame;

/// Keys checked, in order, when a prediction is an object
const PREDICTION_KEYS: [&str; 4] = ["content", "image", "output", "data"];

/// Client for a Vertex-AI-style `:predict` endpoint that maps one image to another
///
/// Request: `{"instances": [{"content": <base64 PNG>}], "parameters": {}}`.
/// Response: `predictions[0]` is either a base64 image string or an object
/// holding one under a well-known key.
#[derive(Clone)]
pub struct InferenceClient {
    predict_url: Option<String>,
    access_token: Option<String>,
    max_response_bytes: u64,
    agent: Agent,
}

impl InferenceClient {
    pub fn from_config(config: &InferenceConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Self {
            predict_url: config.predict_url(),
            access_token: config.access_token.clone(),
            max_response_bytes: config.max_response_bytes,
            agent,
        }
    }

    pub fn predict_url(&self) -> Option<&str> {
        self.predict_url.as_deref()
    }

    /// Send one frame through the endpoint and decode the returned image
    pub fn predict(&self, frame: &Frame) -> Result<Frame, TransformError> {
        let url = self.predict_url.as_deref().ok_or(TransformError::NotConfigured)?;

        let png = frame.to_png_bytes().map_err(|e| TransformError::Encode {
            reason: e.to_string(),
        })?;
        let body = json!({
            "instances": [{ "content": STANDARD.encode(png) }],
            "parameters": {},
        });

        let mut request = self.agent.post(url);
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let mut response = request.send_json(&body).map_err(|e| TransformError::Transport {
            reason: e.to_string(),
        })?;
        let payload: Value = response
            .body_mut()
            .with_config()
            .limit(self.max_response_bytes)
            .read_json()
            .map_err(|e| TransformError::MalformedResponse {
            reason: e.to_string(),
        })?;

        let output = decode_prediction(&payload)?;
        debug!("Prediction returned {}x{} frame", output.width(), output.height());
        Ok(output)
    }
}

impl fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceClient")
            .field("predict_url", &self.predict_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

/// Extract the transformed image from a prediction response
pub fn decode_prediction(payload: &Value) -> Result<Frame, TransformError> {
    let first = payload
        .get("predictions")
        .and_then(Value::as_array)
        .and_then(|predictions| predictions.first())
        .ok_or_else(|| TransformError::MalformedResponse {
            reason: "no predictions".to_string(),
        })?;

    let candidates: Vec<&str> = match first {
        Value::String(encoded) => vec![encoded.as_str()],
        Value::Object(fields) => PREDICTION_KEYS
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .collect(),
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter_map(|encoded| STANDARD.decode(encoded).ok())
        .find_map(|bytes| Frame::from_encoded_bytes(&bytes).ok())
        .ok_or_else(|| TransformError::MalformedResponse {
            reason: "prediction holds no decodable image".to_string(),
        })
}
