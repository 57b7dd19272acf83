//! Client for the background replacement service.
//!
//! Synchronous JSON call: `POST {base}/api/background-generator` with
//! the composited image URL, answering `{"result": [[url, seed,
//! filename], ...]}`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use lookbook_core::normalize;
use lookbook_core::settings::BackgroundParameters;

use crate::job::{ensure_success, send_with_retry, JobError};

/// JSON body for one background replacement.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundRequest {
    /// Must be a stable public URL; run it through the upload client
    /// first when in doubt.
    pub image_url: String,
    pub bg_prompt: String,
    pub fast: bool,
    pub refine_prompt: bool,
    pub original_quality: bool,
    pub num_results: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

impl BackgroundRequest {
    pub fn new(image_url: impl Into<String>, params: &BackgroundParameters) -> Self {
        Self {
            image_url: image_url.into(),
            bg_prompt: params.prompt.clone(),
            fast: params.mode == "fast",
            refine_prompt: params.refine_prompt,
            original_quality: params.original_quality,
            num_results: params.num_results,
            reference_image_url: params.reference_image_url.clone(),
        }
    }
}

/// Background replacement boundary, mockable for orchestrator tests.
#[async_trait]
pub trait BackgroundService: Send + Sync {
    /// Generate background variations, returning their raw URLs. An
    /// empty answer is not an error; the caller decides what a key
    /// without results means.
    async fn generate(&self, request: &BackgroundRequest) -> Result<Vec<String>, JobError>;
}

pub struct HttpBackgroundClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackgroundClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BackgroundService for HttpBackgroundClient {
    async fn generate(&self, request: &BackgroundRequest) -> Result<Vec<String>, JobError> {
        let url = format!("{}/api/background-generator", self.base_url);
        let response = send_with_retry(|| self.http.post(&url).json(request)).await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(normalize::extract_background_urls(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_mode_maps_to_the_boolean_flag() {
        let params = BackgroundParameters {
            prompt: "sunlit studio".to_string(),
            ..Default::default()
        };
        let request = BackgroundRequest::new("https://img/1.png", &params);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["fast"], true);
        assert_eq!(json["bg_prompt"], "sunlit studio");
        assert!(json.get("reference_image_url").is_none());

        let quality = BackgroundParameters {
            mode: "quality".to_string(),
            ..params
        };
        let request = BackgroundRequest::new("https://img/1.png", &quality);
        assert_eq!(serde_json::to_value(&request).unwrap()["fast"], false);
    }
}
