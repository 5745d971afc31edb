use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    transform::FailurePolicy,
};

/// Main configuration for Stereocast
///
/// Loaded once at startup (file, then environment overlay) and handed to the
/// engine as an immutable value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame sampling and output container settings
    pub pipeline: PipelineConfig,

    /// Remote 2D-to-3D inference endpoint
    pub inference: InferenceConfig,

    /// Cloud storage publishing
    pub storage: StorageConfig,

    /// Entry point settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary key lookup
    ///
    /// Unset or empty variables leave the current value untouched.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("VERTEX_ENABLED") {
            self.inference.enabled = parse_flag(&v);
        }
        if let Some(v) = get("VERTEX_PROJECT_ID") {
            self.inference.project_id = Some(v);
        }
        if let Some(v) = get("VERTEX_LOCATION") {
            self.inference.location = Some(v);
        }
        if let Some(v) = get("VERTEX_ENDPOINT_ID") {
            self.inference.endpoint_id = Some(v);
        }
        if let Some(v) = get("VERTEX_ENDPOINT") {
            self.inference.endpoint = Some(v);
        }
        if let Some(v) = get("VERTEX_API_BASE") {
            self.inference.api_base = Some(v);
        }
        if let Some(v) = get("VERTEX_ACCESS_TOKEN") {
            self.inference.access_token = Some(v);
        }

        if let Some(v) = get("GCS_BUCKET_NAME") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("MAKE_PUBLIC") {
            self.storage.make_public = parse_flag(&v);
        }
        if let Some(v) = get("GCS_ACCESS_TOKEN") {
            self.storage.access_token = Some(v);
        }
        if let Some(v) = get("GCS_SIGNER_ENDPOINT") {
            self.storage.signer_endpoint = Some(v);
        }

        if let Some(v) = get("PUBLIC_BASE_URL") {
            self.server.base_url = Some(v);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.inference.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Only a case-insensitive "true" enables a flag
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Frame pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate for frame extraction (frames per second)
    pub target_fps: u32,

    /// Frame rate written into the output container
    pub output_fps: u32,

    /// ffmpeg encoder name for the output
    pub codec: String,

    /// Four-character code stored in the container
    pub codec_tag: String,

    /// Directory holding the merged output
    pub output_dir: PathBuf,

    /// File name of the merged output; every run overwrites it
    pub output_name: String,

    /// Directory where raw uploads are persisted
    pub upload_dir: PathBuf,

    /// URL prefix under which `output_dir` is served
    pub static_url_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 24,
            output_fps: 24,
            codec: "mpeg4".to_string(),
            codec_tag: "mp4v".to_string(),
            output_dir: PathBuf::from("static"),
            output_name: "output.mp4".to_string(),
            upload_dir: PathBuf::from("tmp"),
            static_url_prefix: "/static".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Full path of the merged output file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }

    /// Relative URL the output is served from, e.g. `/static/output.mp4`
    pub fn static_url(&self) -> String {
        format!("{}/{}", self.static_url_prefix.trim_end_matches('/'), self.output_name)
    }

    fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.target_fps".to_string(),
                value: self.target_fps.to_string()
            }.into());
        }

        if self.output_fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.output_fps".to_string(),
                value: self.output_fps.to_string()
            }.into());
        }

        if self.output_name.is_empty() || self.output_name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.output_name".to_string(),
                value: self.output_name.clone()
            }.into());
        }

        Ok(())
    }
}

/// Base64 PNG predictions for 4K frames run well past 10 MiB
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Remote inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Send frames to the endpoint at all
    pub enabled: bool,

    pub project_id: Option<String>,
    pub location: Option<String>,
    pub endpoint_id: Option<String>,

    /// Full endpoint resource name; wins over the three parts above
    pub endpoint: Option<String>,

    /// Override for `https://{location}-aiplatform.googleapis.com`
    pub api_base: Option<String>,

    /// Bearer token sent with every request
    pub access_token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Largest prediction response accepted, in bytes
    pub max_response_bytes: u64,

    /// What a failed frame does to the run
    pub failure_policy: FailurePolicy,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: None,
            location: None,
            endpoint_id: None,
            endpoint: None,
            api_base: None,
            access_token: None,
            timeout_secs: 60,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            failure_policy: FailurePolicy::FailOpen,
        }
    }
}

impl InferenceConfig {
    /// Endpoint resource name, e.g. `projects/p/locations/l/endpoints/123`
    ///
    /// Empty when neither the full name nor all three parts are set.
    pub fn endpoint_resource(&self) -> String {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            return endpoint.to_string();
        }

        match (&self.project_id, &self.location, &self.endpoint_id) {
            (Some(project), Some(location), Some(id)) => {
                format!("projects/{}/locations/{}/endpoints/{}", project, location, id)
            }
            _ => String::new(),
        }
    }

    /// Base URL of the prediction API
    pub fn api_base_url(&self) -> Option<String> {
        if let Some(base) = self.api_base.as_deref().filter(|b| !b.is_empty()) {
            return Some(base.trim_end_matches('/').to_string());
        }

        let location = self.location.clone().or_else(|| {
            // projects/{p}/locations/{l}/endpoints/{id}
            let resource = self.endpoint_resource();
            let mut parts = resource.split('/');
            while let Some(part) = parts.next() {
                if part == "locations" {
                    return parts.next().map(str::to_string);
                }
            }
            None
        })?;

        Some(format!("https://{}-aiplatform.googleapis.com", location))
    }

    /// Full `:predict` URL, if the endpoint is addressable
    pub fn predict_url(&self) -> Option<String> {
        let resource = self.endpoint_resource();
        if resource.is_empty() {
            return None;
        }
        let base = self.api_base_url()?;
        Some(format!("{}/v1/{}:predict", base, resource))
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "inference.timeout_secs".to_string(),
                value: self.timeout_secs.to_string()
            }.into());
        }

        if self.max_response_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "inference.max_response_bytes".to_string(),
                value: self.max_response_bytes.to_string()
            }.into());
        }

        if self.enabled && self.failure_policy == FailurePolicy::FailClosed && self.predict_url().is_none() {
            return Err(ConfigError::MissingKey {
                key: "inference.endpoint".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Cloud storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Target bucket; empty disables cloud publishing
    pub bucket: String,

    /// Publish with a public-read ACL instead of a signed URL
    pub make_public: bool,

    /// Object name inside the bucket
    pub object_name: String,

    /// Validity of signed URLs
    pub signed_url_ttl_secs: u64,

    /// Bearer token for the storage API
    pub access_token: Option<String>,

    /// Storage API root
    pub api_base: String,

    /// External service that signs object URLs
    pub signer_endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            make_public: false,
            object_name: "outputs/output.mp4".to_string(),
            signed_url_ttl_secs: 3600,
            access_token: None,
            api_base: "https://storage.googleapis.com".to_string(),
            signer_endpoint: None,
        }
    }
}

impl StorageConfig {
    pub fn is_enabled(&self) -> bool {
        !self.bucket.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.signed_url_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "storage.signed_url_ttl_secs".to_string(),
                value: self.signed_url_ttl_secs.to_string()
            }.into());
        }

        if self.is_enabled() && self.object_name.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "storage.object_name".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Entry point configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Prefix for relative download URLs, e.g. `http://localhost:8000`
    pub base_url: Option<String>,
}
