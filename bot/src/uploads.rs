//! Image host and paste service clients.
//!
//! Both sit behind traits so the ingestion path can be exercised without
//! network access. Every request runs on a client with bounded connect and
//! request timeouts.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

/// Upload failures. Callers log them and leave the field empty.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Transport or decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    /// The service answered without a usable link.
    #[error("no link in response")]
    EmptyResponse,
    /// The local file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being uploaded.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Hosts an image and returns its public link.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload a local image.
    async fn upload(&self, image: &Path) -> Result<String, UploadError>;
}

/// Stores a text and returns its public link.
#[async_trait]
pub trait PasteService: Send + Sync {
    /// Publish `text`.
    async fn paste(&self, text: &str) -> Result<String, UploadError>;
}

/// Build the shared outbound HTTP client.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .user_agent(concat!("propolis-bot/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// ptpimg-style image host: multipart upload answered with
/// `[{"code": "...", "ext": "..."}]`.
#[derive(Debug, Clone)]
pub struct PtpImgHost {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    code: String,
    ext: String,
}

impl PtpImgHost {
    /// Create a client for `upload_url` authenticated with `api_key`.
    pub fn new(client: reqwest::Client, upload_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            upload_url: upload_url.into(),
            api_key: api_key.into(),
        }
    }

    fn image_base(&self) -> String {
        url::Url::parse(&self.upload_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| format!("{}://{h}", u.scheme())))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ImageHost for PtpImgHost {
    async fn upload(&self, image: &Path) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(image).await.map_err(|source| UploadError::Io {
            path: image.display().to_string(),
            source,
        })?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "overview.png".to_owned());
        let part = Part::bytes(bytes).file_name(file_name).mime_str("image/png")?;
        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .part("file-upload[0]", part);

        let response = self.client.post(&self.upload_url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(UploadError::Status(response.status()));
        }
        let uploaded: Vec<UploadedImage> = response.json().await?;
        let first = uploaded.first().ok_or(UploadError::EmptyResponse)?;
        Ok(format!("{}/{}.{}", self.image_base(), first.code, first.ext))
    }
}

/// Paste service taking a JSON `{"content": ...}` POST and answering
/// `{"url": ...}`.
#[derive(Debug, Clone)]
pub struct HttpPasteService {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct PasteResponse {
    url: Option<String>,
}

impl HttpPasteService {
    /// Create a client posting to `endpoint`.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PasteService for HttpPasteService {
    async fn paste(&self, text: &str) -> Result<String, UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UploadError::Status(response.status()));
        }
        let body: PasteResponse = response.json().await?;
        body.url
            .filter(|u| !u.is_empty())
            .ok_or(UploadError::EmptyResponse)
    }
}
