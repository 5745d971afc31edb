use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VideoError};

/// Body returned to the uploader on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub download_url: String,
}

impl DownloadResponse {
    /// Relative URLs (`/static/...`) are prefixed with `base_url` when one is known
    pub fn new(url: String, base_url: Option<&str>) -> Self {
        let download_url = match base_url {
            Some(base) if url.starts_with('/') => format!("{}{}", base.trim_end_matches('/'), url),
            _ => url,
        };
        Self { download_url }
    }
}

/// Where raw uploads are persisted before processing
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist an uploaded payload under its client-supplied name
    ///
    /// Only the final path component of `file_name` is used; an upload with
    /// the same name replaces the previous one.
    pub async fn store(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| VideoError::InvalidParameters {
            details: format!("unusable upload file name '{}'", file_name),
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, contents).await?;

        info!("Stored upload {:?} ({} bytes)", path, contents.len());
        Ok(path)
    }

    /// Persist a local file as if it had been uploaded
    pub async fn ingest<P: AsRef<Path>>(&self, source: P) -> Result<PathBuf> {
        let source = source.as_ref();
        let contents = tokio::fs::read(source)
            .await
            .map_err(|e| VideoError::open_failed(source, e.to_string()))?;
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.mp4");

        self.store(file_name, &contents).await
    }
}

/// Final path component, without traversal or empty names
fn sanitize_file_name(file_name: &str) -> Option<&str> {
    let name = file_name.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}
