//! Bundle of the five upstream service boundaries the orchestrator
//! fans out to. Trait objects so tests can swap in mocks.

use std::sync::Arc;

use lookbook_clients::{
    BackgroundService, HttpBackgroundClient, HttpModelGenerationClient, HttpTaggingClient,
    HttpTryOnClient, HttpUploadClient, ModelGenerationService, TaggingService, TryOnService,
    UploadService,
};

#[derive(Clone)]
pub struct Services {
    pub model_generation: Arc<dyn ModelGenerationService>,
    pub try_on: Arc<dyn TryOnService>,
    pub background: Arc<dyn BackgroundService>,
    pub tagging: Arc<dyn TaggingService>,
    pub upload: Arc<dyn UploadService>,
}

impl Services {
    /// Wire every boundary to its HTTP client. `api_base` hosts the
    /// generation services; `upload_base` hosts the object store used
    /// for public-URL repair.
    pub fn http(http: reqwest::Client, api_base: &str, upload_base: &str) -> Self {
        Self {
            model_generation: Arc::new(HttpModelGenerationClient::new(http.clone(), api_base)),
            try_on: Arc::new(HttpTryOnClient::new(http.clone(), api_base)),
            background: Arc::new(HttpBackgroundClient::new(http.clone(), api_base)),
            tagging: Arc::new(HttpTaggingClient::new(http.clone(), api_base)),
            upload: Arc::new(HttpUploadClient::new(http, upload_base)),
        }
    }
}
