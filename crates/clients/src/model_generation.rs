//! Client for the text-to-image model generation service.
//!
//! Submit is `POST {base}/api/model-generation/execute`; pending jobs
//! are polled at `GET {base}/api/model-generation/status?id=` on a
//! steady 2s cadence.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use lookbook_core::garment::{GarmentInfo, ModelType};
use lookbook_core::normalize;
use lookbook_core::settings::GenerationSettings;
use lookbook_core::types::CombinationKey;

use crate::job::{
    await_terminal, ensure_success, send_with_retry, JobError, JobPoller, PollOutcome,
    ProgressSink, RetryPolicy, SubmitOutcome,
};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Combination attributes echoed to the generation service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAttributes {
    pub gender: String,
    pub body_size: String,
    #[serde(rename = "skin_color")]
    pub skin_color: String,
    pub age: String,
    pub eyes: String,
    pub pose_type: String,
    pub model_type: ModelType,
    pub wear_type: String,
    #[serde(rename = "styleUUID")]
    pub style_uuid: String,
    pub enhance_prompt: bool,
}

/// JSON body for one generation request.
///
/// One request asks for one image; the fan-out issues as many requests
/// per combination as variations were configured.
#[derive(Debug, Clone, Serialize)]
pub struct ModelGenerationRequest {
    pub prompt: String,
    #[serde(rename = "negativePrompt")]
    pub negative_prompt: String,
    pub guidance_scale: f64,
    pub num_images: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub enhance_detail: bool,
    pub attributes: ModelAttributes,
}

impl ModelGenerationRequest {
    /// Build the request for one combination: the configured prompt
    /// with the combination's body size and skin tone folded in.
    pub fn for_combination(
        settings: &GenerationSettings,
        garment: &GarmentInfo,
        key: CombinationKey,
    ) -> Self {
        let prompt = format!(
            "{}, {}, {}, {} body, {} skin tone, {} years old, {} style",
            settings.prompt,
            settings.gender,
            settings.pose_type,
            key.body_size.as_str(),
            key.skin_tone.as_str(),
            settings.age,
            settings.style_uuid,
        );
        Self {
            prompt,
            negative_prompt: settings.advanced_settings.negative_prompt.clone(),
            guidance_scale: settings.advanced_settings.guidance_scale,
            num_images: 1,
            seed: settings.advanced_settings.seed,
            enhance_detail: settings.enhance_details,
            attributes: ModelAttributes {
                gender: settings.gender.clone(),
                body_size: key.body_size.as_str().to_string(),
                skin_color: key.skin_tone.as_str().to_string(),
                age: settings.age.clone(),
                eyes: settings.eyes.clone(),
                pose_type: settings.pose_type.clone(),
                model_type: garment.model_type,
                wear_type: garment.wear_type.as_str().to_string(),
                style_uuid: settings.style_uuid.clone(),
                enhance_prompt: settings.enhance_prompt,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Model generation boundary, mockable for orchestrator tests.
#[async_trait]
pub trait ModelGenerationService: Send + Sync {
    /// Submit one request and wait for its images. Returned URLs are
    /// raw; canonicalization is the caller's concern.
    async fn generate(
        &self,
        request: &ModelGenerationRequest,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError>;

    /// Keep waiting on a job whose first polling budget ran out.
    async fn resume(
        &self,
        job_id: &str,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError>;
}

pub struct HttpModelGenerationClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpModelGenerationClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            policy: RetryPolicy::model_generation(),
        }
    }

    async fn submit(&self, request: &ModelGenerationRequest) -> Result<SubmitOutcome, JobError> {
        let url = format!("{}/api/model-generation/execute", self.base_url);
        let response = send_with_retry(|| self.http.post(&url).json(request)).await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(SubmitOutcome::classify(body))
    }
}

#[async_trait]
impl JobPoller for HttpModelGenerationClient {
    async fn poll(&self, job_id: &str) -> Result<PollOutcome, JobError> {
        let url = format!("{}/api/model-generation/status", self.base_url);
        let response = self.http.get(&url).query(&[("id", job_id)]).send().await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(PollOutcome::classify(&body))
    }
}

#[async_trait]
impl ModelGenerationService for HttpModelGenerationClient {
    async fn generate(
        &self,
        request: &ModelGenerationRequest,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError> {
        let payload = match self.submit(request).await? {
            SubmitOutcome::Finished(body) => body,
            SubmitOutcome::Pending { job_id } => {
                tracing::debug!(job_id, "model generation queued, polling");
                await_terminal(self, &job_id, &self.policy, on_progress).await?
            }
        };
        Ok(normalize::extract_image_urls(&payload))
    }

    async fn resume(
        &self,
        job_id: &str,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError> {
        let payload = await_terminal(self, job_id, &self.policy, on_progress).await?;
        Ok(normalize::extract_image_urls(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookbook_core::garment::WearType;
    use lookbook_core::types::{BodySize, SkinTone};

    fn garment() -> GarmentInfo {
        GarmentInfo {
            image_url: Some("http://example.com/dress.png".to_string()),
            model_type: ModelType::FullBody,
            wear_type: WearType::LongDress,
            name: "dress".to_string(),
        }
    }

    #[test]
    fn prompt_folds_in_the_combination() {
        let settings = GenerationSettings {
            prompt: "professional model".to_string(),
            age: "25-30".to_string(),
            ..Default::default()
        };
        let key = CombinationKey::new(BodySize::PlusSize, SkinTone::Dark);
        let request = ModelGenerationRequest::for_combination(&settings, &garment(), key);
        assert!(request.prompt.starts_with("professional model, female, neutral"));
        assert!(request.prompt.contains("plus-size body"));
        assert!(request.prompt.contains("dark skin tone"));
        assert!(request.prompt.contains("25-30 years old"));
        assert_eq!(request.num_images, 1);
    }

    #[test]
    fn attributes_serialize_with_wire_names() {
        let settings = GenerationSettings {
            prompt: "p".to_string(),
            ..Default::default()
        };
        let key = CombinationKey::new(BodySize::Thin, SkinTone::Light);
        let request = ModelGenerationRequest::for_combination(&settings, &garment(), key);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["negativePrompt"], settings.advanced_settings.negative_prompt);
        assert_eq!(json["attributes"]["bodySize"], "thin");
        assert_eq!(json["attributes"]["skin_color"], "light");
        assert_eq!(json["attributes"]["modelType"], "Full Body");
        assert_eq!(json["attributes"]["styleUUID"], settings.style_uuid);
        // Unset seed is omitted, not null.
        assert!(json.get("seed").is_none());
    }
}
