//! Client for the retail image tagging service.
//!
//! Multipart `POST {base}/api/tag-image` with the image URL and the
//! captioning model tag; answers synchronously with an analysis
//! payload and an optional visualization image.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{ensure_success, send_with_retry, JobError};

/// One tagging request.
#[derive(Debug, Clone)]
pub struct TaggingRequest {
    /// Must be a stable public URL.
    pub image_url: String,
    /// Captioning model tag, e.g. `gpt-4o`.
    pub model: String,
}

/// The tagging service's answer: free-form analysis plus an optional
/// annotated visualization URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAnalysis {
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub visualization: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Tagging boundary, mockable for orchestrator tests.
#[async_trait]
pub trait TaggingService: Send + Sync {
    async fn tag(&self, request: &TaggingRequest) -> Result<TagAnalysis, JobError>;
}

pub struct HttpTaggingClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTaggingClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TaggingService for HttpTaggingClient {
    async fn tag(&self, request: &TaggingRequest) -> Result<TagAnalysis, JobError> {
        let url = format!("{}/api/tag-image", self.base_url);
        let form = || {
            Form::new()
                .text("imageUrl", request.image_url.clone())
                .text("model", request.model.clone())
        };
        let response = send_with_retry(|| self.http.post(&url).multipart(form())).await?;
        let analysis: TagAnalysis = ensure_success(response).await?.json().await?;
        if analysis.success {
            Ok(analysis)
        } else {
            let message = analysis
                .error
                .unwrap_or_else(|| "unknown error during tagging".to_string());
            Err(JobError::Upstream(message))
        }
    }
}
