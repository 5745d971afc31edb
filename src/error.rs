use thiserror::Error;

/// Main error type for the Stereocast library
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Frame transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Publishing error: {0}")]
    Publish(#[from] PublishError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Video container errors
#[derive(Error, Debug)]
pub enum VideoError {
    /// Source container unreadable, or output container unwritable
    #[error("Failed to open video container {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// Nothing to encode: extraction produced no frames
    #[error("No frames to merge")]
    EmptyInput,

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Invalid video parameters: {details}")]
    InvalidParameters { details: String },
}

/// Remote inference errors
///
/// Recovered locally under the fail-open policy: the frame keeps its original pixels.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Inference endpoint is not configured")]
    NotConfigured,

    #[error("Failed to encode frame: {reason}")]
    Encode { reason: String },

    #[error("Inference request failed: {reason}")]
    Transport { reason: String },

    #[error("Inference response unusable: {reason}")]
    MalformedResponse { reason: String },
}

/// Cloud publishing errors
///
/// Always recovered by falling back to the local static URL.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Cloud storage is not configured: {details}")]
    NotConfigured { details: String },

    #[error("Upload of {object} failed: {reason}")]
    UploadFailed { object: String, reason: String },

    #[error("Signing URL for {object} failed: {reason}")]
    SigningFailed { object: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ConverterError
pub type Result<T> = std::result::Result<T, ConverterError>;

impl VideoError {
    pub fn open_failed<P: AsRef<std::path::Path>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::OpenFailed {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}

impl ConverterError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this error aborts a pipeline run
    ///
    /// Only unreadable/unwritable containers and empty frame sequences are fatal;
    /// remote-service failures degrade to local defaults before they get here.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Video(VideoError::OpenFailed { .. }) | Self::Video(VideoError::EmptyInput)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Video(VideoError::OpenFailed { path, .. }) => {
                format!("Could not open video '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Video(VideoError::EmptyInput) => {
                "The uploaded video contains no decodable frames.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
