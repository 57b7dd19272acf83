//! Client for the virtual try-on service.
//!
//! Submit is a multipart `POST {base}/api/virtual-try-on/execute`;
//! pending jobs are polled at `GET {base}/api/virtual-try-on/query/{id}`
//! with linear backoff under a 120s wall budget.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde_json::Value;

use lookbook_core::normalize;
use lookbook_core::settings::TryOnParameters;

use crate::job::{
    await_terminal, ensure_success, send_with_retry, JobError, JobPoller, PollOutcome,
    ProgressSink, RetryPolicy, SubmitOutcome,
};

/// One try-on request: a selected model image wearing the garment.
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    pub model_image_url: String,
    pub clothing_image_url: String,
    /// Wear-type wire string, e.g. `long-dress`.
    pub clothing_type: String,
    pub gender: String,
    pub parameters: TryOnParameters,
}

impl TryOnRequest {
    /// Multipart form in the field names the service expects. The
    /// sample count is sent twice (`numSamples` and `generateCount`)
    /// because providers disagree on which one they read.
    fn form(&self) -> Form {
        let samples = self.parameters.num_samples.to_string();
        Form::new()
            .text("modelImageUrl", self.model_image_url.clone())
            .text("clothingImageUrl", self.clothing_image_url.clone())
            .text("clothingType", self.clothing_type.clone())
            .text("gender", self.gender.clone())
            .text("apiProvider", self.parameters.api_provider.clone())
            .text("numSamples", samples.clone())
            .text("generateCount", samples)
            .text("mode", self.parameters.mode.clone())
            .text("restoreBackground", self.parameters.restore_background.to_string())
            .text("nsfw_filter", self.parameters.nsfw_filter.to_string())
            .text("adjustHands", self.parameters.adjust_hands.to_string())
            .text("restoreClothes", self.parameters.restore_clothes.to_string())
            .text("seed", self.parameters.seed.to_string())
            .text("garmentPhotoType", self.parameters.garment_photo_type.clone())
    }
}

/// Try-on boundary, mockable for orchestrator tests.
#[async_trait]
pub trait TryOnService: Send + Sync {
    /// Run one try-on and return the raw result URLs.
    async fn try_on(
        &self,
        request: &TryOnRequest,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError>;
}

pub struct HttpTryOnClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HttpTryOnClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            policy: RetryPolicy::try_on(),
        }
    }

    async fn submit(&self, request: &TryOnRequest) -> Result<SubmitOutcome, JobError> {
        let url = format!("{}/api/virtual-try-on/execute", self.base_url);
        // The form is rebuilt per attempt; a consumed multipart body
        // cannot be resent.
        let response =
            send_with_retry(|| self.http.post(&url).multipart(request.form())).await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(SubmitOutcome::classify(body))
    }
}

#[async_trait]
impl JobPoller for HttpTryOnClient {
    async fn poll(&self, job_id: &str) -> Result<PollOutcome, JobError> {
        let url = format!("{}/api/virtual-try-on/query/{job_id}", self.base_url);
        let response = self.http.get(&url).send().await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(PollOutcome::classify(&body))
    }
}

#[async_trait]
impl TryOnService for HttpTryOnClient {
    async fn try_on(
        &self,
        request: &TryOnRequest,
        on_progress: ProgressSink<'_>,
    ) -> Result<Vec<String>, JobError> {
        let payload = match self.submit(request).await? {
            SubmitOutcome::Finished(body) => body,
            SubmitOutcome::Pending { job_id } => {
                tracing::debug!(job_id, "try-on queued, polling");
                await_terminal(self, &job_id, &self.policy, on_progress).await?
            }
        };
        Ok(normalize::extract_image_urls(&payload))
    }
}
