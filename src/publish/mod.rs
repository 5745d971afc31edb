//! # Output Publishing
//!
//! Turns the merged output file into a retrievable URL. Without cloud storage
//! the file is exposed under a fixed static path; with it, the file is uploaded
//! and any upload or signing failure falls back to that same static path.

pub mod gcs;

use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;

pub use gcs::GcsPublisher;

/// Serves the output from the local static directory
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    static_url: String,
}

impl LocalPublisher {
    pub fn new<S: Into<String>>(static_url: S) -> Self {
        Self { static_url: static_url.into() }
    }

    /// The output is already in place; its URL never varies
    pub fn publish(&self, path: &Path) -> String {
        info!("Serving {:?} at {}", path, self.static_url);
        self.static_url.clone()
    }
}

/// Publishing capability resolved once from configuration
#[derive(Debug, Clone)]
pub enum Publisher {
    Local(LocalPublisher),
    Cloud {
        storage: GcsPublisher,
        fallback: LocalPublisher,
    },
}

impl Publisher {
    pub fn from_config(config: &Config) -> Self {
        let local = LocalPublisher::new(config.pipeline.static_url());
        if config.storage.is_enabled() {
            Self::Cloud {
                storage: GcsPublisher::from_config(&config.storage),
                fallback: local,
            }
        } else {
            Self::Local(local)
        }
    }

    /// Return a URL for the file at `path`
    ///
    /// Never fails: cloud errors are logged and replaced by the local URL.
    pub fn publish(&self, path: &Path) -> String {
        match self {
            Self::Local(local) => local.publish(path),
            Self::Cloud { storage, fallback } => match storage.publish(path) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Cloud publish to bucket '{}' failed, serving locally: {}", storage.bucket(), e);
                    fallback.publish(path)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    #[test]
    fn test_local_by_default() {
        let publisher = Publisher::from_config(&Config::default());
        assert!(matches!(publisher, Publisher::Local(_)));
        assert_eq!(publisher.publish(Path::new("static/output.mp4")), "/static/output.mp4");
    }

    #[test]
    fn test_cloud_failure_falls_back_to_static_url() {
        let server = StubServer::spawn(|_| (500, "{}".to_string()));
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output.mp4");
        std::fs::write(&output, b"mp4").unwrap();

        let mut config = Config::default();
        config.storage.bucket = "renders".to_string();
        config.storage.make_public = true;
        config.storage.api_base = server.url();

        let publisher = Publisher::from_config(&config);
        assert!(matches!(publisher, Publisher::Cloud { .. }));
        assert_eq!(publisher.publish(&output), "/static/output.mp4");
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn test_cloud_success_returns_cloud_url() {
        let server = StubServer::spawn(|_| (200, "{}".to_string()));
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output.mp4");
        std::fs::write(&output, b"mp4").unwrap();

        let mut config = Config::default();
        config.storage.bucket = "renders".to_string();
        config.storage.make_public = true;
        config.storage.api_base = server.url();

        let url = Publisher::from_config(&config).publish(&output);
        assert_eq!(url, format!("{}/renders/outputs/output.mp4", server.url()));
    }
}
