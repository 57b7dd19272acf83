//! Object-store upload used to repair image URLs the generation
//! providers cannot fetch themselves.
//!
//! Proxied URLs, `data:` URLs, and known-flaky CDN hosts are
//! downloaded (or decoded) and re-uploaded through
//! `POST {upload_base}/background/upload-to-bria`, which answers with
//! a stable public URL.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use lookbook_core::normalize;

use crate::job::{ensure_success, JobError};

/// Public-URL repair boundary, mockable for orchestrator tests.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Return a URL the upstream providers can fetch. URLs that are
    /// already public pass through untouched; everything else is
    /// re-uploaded under `name`.
    async fn ensure_public_url(&self, url: &str, name: &str) -> Result<String, JobError>;
}

pub struct HttpUploadClient {
    http: reqwest::Client,
    upload_base: String,
}

impl HttpUploadClient {
    pub fn new(http: reqwest::Client, upload_base: impl Into<String>) -> Self {
        Self {
            http,
            upload_base: upload_base.into(),
        }
    }

    /// Obtain the image bytes behind `url`, unwrapping the proxy and
    /// decoding `data:` URLs locally instead of fetching them.
    async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, String), JobError> {
        if let Some((media_type, bytes)) = decode_data_url(url) {
            return Ok((bytes, media_type));
        }
        let target = normalize::unwrap_proxied(url).unwrap_or_else(|| url.to_string());
        let response = self.http.get(&target).send().await?;
        let response = ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok((bytes, content_type))
    }
}

#[async_trait]
impl UploadService for HttpUploadClient {
    async fn ensure_public_url(&self, url: &str, name: &str) -> Result<String, JobError> {
        if !normalize::needs_public_url(url) {
            return Ok(url.to_string());
        }
        tracing::debug!(name, "re-uploading image for a public URL");
        let (bytes, content_type) = self.fetch_bytes(url).await?;
        let part = Part::bytes(bytes)
            .file_name(format!("{name}.png"))
            .mime_str(&content_type)?;
        let form = Form::new().part("file", part);
        let endpoint = format!("{}/background/upload-to-bria", self.upload_base);
        let response = self.http.post(&endpoint).multipart(form).send().await?;
        let body: Value = ensure_success(response).await?.json().await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(JobError::MalformedResponse)
    }
}

/// Decode `data:<media>;base64,<payload>` into bytes and a media type.
fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header
        .strip_suffix(";base64")?
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("image/png")
        .to_string();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    Some((media_type, bytes))
}
