use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use ureq::Agent;

use crate::config::StorageConfig;
use crate::error::PublishError;

#[derive(Debug, Deserialize)]
struct SignerResponse {
    #[serde(alias = "url")]
    signed_url: String,
}

/// Publishes the merged output to a Google Cloud Storage bucket
///
/// Uploads through the JSON API's media endpoint. Public objects get a
/// public-read ACL and a plain object URL; private objects get a
/// time-limited URL from the configured signing service.
#[derive(Clone)]
pub struct GcsPublisher {
    bucket: String,
    object_name: String,
    make_public: bool,
    ttl_secs: u64,
    access_token: Option<String>,
    api_base: String,
    signer_endpoint: Option<String>,
    agent: Agent,
}

impl GcsPublisher {
    pub fn from_config(config: &StorageConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(300)))
            .build()
            .into();

        Self {
            bucket: config.bucket.clone(),
            object_name: config.object_name.clone(),
            make_public: config.make_public,
            ttl_secs: config.signed_url_ttl_secs,
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            signer_endpoint: config.signer_endpoint.clone(),
            agent,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload `path` and return a URL it can be fetched from
    pub fn publish(&self, path: &Path) -> Result<String, PublishError> {
        if self.bucket.is_empty() {
            return Err(PublishError::NotConfigured {
                details: "no bucket".to_string(),
            });
        }

        self.upload(path)?;

        if self.make_public {
            Ok(self.public_url())
        } else {
            self.signed_url()
        }
    }

    /// `{api_base}/{bucket}/{object}`
    pub fn public_url(&self) -> String {
        format!("{}/{}/{}", self.api_base, self.bucket, self.object_name)
    }

    fn upload(&self, path: &Path) -> Result<(), PublishError> {
        let failed = |reason: String| PublishError::UploadFailed {
            object: self.object_name.clone(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| failed(format!("reading {:?}: {}", path, e)))?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.api_base, self.bucket);

        let mut request = self
            .agent
            .post(&url)
            .query("uploadType", "media")
            .query("name", &self.object_name)
            .header("Content-Type", "video/mp4");
        if self.make_public {
            request = request.query("predefinedAcl", "publicRead");
        }
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        request.send(&bytes[..]).map_err(|e| failed(e.to_string()))?;
        info!("Uploaded {} bytes to gs://{}/{}", bytes.len(), self.bucket, self.object_name);
        Ok(())
    }

    fn signed_url(&self) -> Result<String, PublishError> {
        let failed = |reason: String| PublishError::SigningFailed {
            object: self.object_name.clone(),
            reason,
        };

        let endpoint = self
            .signer_endpoint
            .as_deref()
            .ok_or_else(|| failed("no signer endpoint configured".to_string()))?;

        let body = json!({
            "bucket": self.bucket,
            "object": self.object_name,
            "method": "GET",
            "expires_in_secs": self.ttl_secs,
        });

        let mut request = self.agent.post(endpoint);
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let mut response = request.send_json(&body).map_err(|e| failed(e.to_string()))?;
        let signed: SignerResponse = response.body_mut().read_json().map_err(|e| failed(e.to_string()))?;

        debug!("Signed URL valid for {}s", self.ttl_secs);
        Ok(signed.signed_url)
    }
}

impl fmt::Debug for GcsPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsPublisher")
            .field("bucket", &self.bucket)
            .field("object_name", &self.object_name)
            .field("make_public", &self.make_public)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use tempfile::tempdir;

    fn storage_config(api_base: String) -> StorageConfig {
        StorageConfig {
            bucket: "renders".to_string(),
            api_base,
            access_token: Some("tok".to_string()),
            ..Default::default()
        }
    }

    fn output_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("output.mp4");
        std::fs::write(&path, b"fake mp4 payload").unwrap();
        path
    }

    #[test]
    fn test_public_upload_returns_object_url() {
        let server = StubServer::spawn(|request| {
            assert_eq!(request.method, "POST");
            assert!(request.path.starts_with("/upload/storage/v1/b/renders/o?"));
            assert!(request.path.contains("uploadType=media"));
            assert!(request.path.contains("predefinedAcl=publicRead"));
            assert_eq!(request.body, b"fake mp4 payload");
            assert_eq!(request.header("content-type").as_deref(), Some("video/mp4"));
            (200, "{}".to_string())
        });

        let dir = tempdir().unwrap();
        let config = StorageConfig {
            make_public: true,
            ..storage_config(server.url())
        };

        let url = GcsPublisher::from_config(&config).publish(&output_file(&dir)).unwrap();
        assert_eq!(url, format!("{}/renders/outputs/output.mp4", server.url()));
    }

    #[test]
    fn test_private_upload_asks_signer() {
        let server = StubServer::spawn(|request| {
            if request.path.starts_with("/upload/") {
                assert!(!request.path.contains("predefinedAcl"));
                return (200, "{}".to_string());
            }
            assert_eq!(request.path, "/sign");
            assert_eq!(request.json["expires_in_secs"], 3600);
            assert_eq!(request.json["object"], "outputs/output.mp4");
            (200, r#"{"signed_url": "https://signed.example/output.mp4?sig=abc"}"#.to_string())
        });

        let dir = tempdir().unwrap();
        let config = StorageConfig {
            signer_endpoint: Some(format!("{}/sign", server.url())),
            ..storage_config(server.url())
        };

        let url = GcsPublisher::from_config(&config).publish(&output_file(&dir)).unwrap();
        assert_eq!(url, "https://signed.example/output.mp4?sig=abc");
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn test_private_upload_without_signer_fails() {
        let server = StubServer::spawn(|_| (200, "{}".to_string()));
        let dir = tempdir().unwrap();

        let err = GcsPublisher::from_config(&storage_config(server.url()))
            .publish(&output_file(&dir))
            .unwrap_err();
        assert!(matches!(err, PublishError::SigningFailed { .. }));
    }

    #[test]
    fn test_rejected_upload() {
        let server = StubServer::spawn(|_| (403, r#"{"error": "forbidden"}"#.to_string()));
        let dir = tempdir().unwrap();

        let err = GcsPublisher::from_config(&storage_config(server.url()))
            .publish(&output_file(&dir))
            .unwrap_err();
        assert!(matches!(err, PublishError::UploadFailed { .. }));
    }

    #[test]
    fn test_missing_bucket() {
        let err = GcsPublisher::from_config(&StorageConfig::default())
            .publish(Path::new("output.mp4"))
            .unwrap_err();
        assert!(matches!(err, PublishError::NotConfigured { .. }));
    }
}
