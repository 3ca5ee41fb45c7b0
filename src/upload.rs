//! Upload collaborator: accepts an image payload and returns a stable
//! reference URL. Two implementations: local disk for development and tests,
//! and an HTTP endpoint for a hosted image service.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Upload failures, surfaced verbatim to the caller.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload rejected by remote (status {status}): {body}")]
    Remote { status: u16, body: String },
    #[error("upload transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store the payload and return a stable reference URL.
    async fn store_image(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

/// Writes payloads under a local directory and returns URLs below a
/// configured public base path.
pub struct DiskUploader {
    dir: PathBuf,
    public_base: String,
}

impl DiskUploader {
    pub fn new(dir: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self { dir: dir.into(), public_base: public_base.into() }
    }
}

#[async_trait]
impl Uploader for DiskUploader {
    async fn store_image(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        fs::create_dir_all(&self.dir).await?;
        let name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
        let path = self.dir.join(&name);
        fs::write(&path, bytes).await?;
        Ok(format!("{}/{}", self.public_base.trim_end_matches('/'), name))
    }
}

/// POSTs payloads to a remote endpoint and relays the URL it returns.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[derive(Debug, serde::Deserialize)]
struct StoredUpload {
    url: String,
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn store_image(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("filename", filename)])
            .header("content-type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Remote { status: status.as_u16(), body });
        }
        let stored: StoredUpload = resp.json().await.map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(stored.url)
    }
}

/// Keep only the last path segment and the characters safe for both the
/// filesystem and a URL.
fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("upload");
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}
