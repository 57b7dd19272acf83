//! The saved artifact record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which pipeline produced a gallery item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GalleryKind {
    ModelGeneration,
    TryOn,
    BgGenerator,
    ImageTagging,
    AllInOne,
}

/// One saved artifact: a thumbnail, the full image set it belongs to,
/// and free-form metadata (tagging analysis, combination key, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    /// Upstream provider tag, e.g. `fashn`.
    pub provider: String,
    pub thumbnail_url: String,
    pub images: Vec<String>,
    #[serde(rename = "type")]
    pub kind: GalleryKind,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GalleryItem {
    pub fn new(
        title: impl Into<String>,
        provider: impl Into<String>,
        thumbnail_url: impl Into<String>,
        images: Vec<String>,
        kind: GalleryKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            date: Utc::now(),
            provider: provider.into(),
            thumbnail_url: thumbnail_url.into(),
            images,
            kind,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
