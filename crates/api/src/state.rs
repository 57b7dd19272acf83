//! Shared application state handed to every handler.

use std::sync::Arc;

use lookbook_gallery::{GalleryBus, GalleryStore};
use lookbook_pipeline::StageOrchestrator;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StageOrchestrator>,
    pub gallery: Arc<dyn GalleryStore>,
    pub gallery_bus: Arc<GalleryBus>,
    /// Client used by the image proxy; the upstream service clients
    /// hold their own copy inside the orchestrator.
    pub http: reqwest::Client,
    pub config: Arc<ServerConfig>,
}
