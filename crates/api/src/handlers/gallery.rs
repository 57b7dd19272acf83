//! Handlers for the saved-image gallery.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lookbook_gallery::{GalleryItem, GalleryKind, SaveOutcome};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveItemRequest {
    pub thumbnail_url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: GalleryKind,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn default_title() -> String {
    "Virtual photoshoot".to_string()
}

fn default_provider() -> String {
    "all-in-one".to_string()
}

fn default_kind() -> GalleryKind {
    GalleryKind::AllInOne
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub saved: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<GalleryItem>,
}

/// GET /api/v1/gallery
pub async fn list_gallery(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let items = state.gallery.list_all().await?;
    Ok(Json(DataResponse::new(items)))
}

/// POST /api/v1/gallery
///
/// Append an image. Appends are idempotent per image URL: a repeated
/// save answers 200 without writing, a fresh one answers 201 and is
/// broadcast to subscribers.
pub async fn save_to_gallery(
    State(state): State<AppState>,
    Json(request): Json<SaveItemRequest>,
) -> AppResult<impl IntoResponse> {
    let mut item = GalleryItem::new(
        request.title,
        request.provider,
        request.thumbnail_url,
        request.images,
        request.kind,
    );
    if let Some(metadata) = request.metadata {
        item = item.with_metadata(metadata);
    }

    match state.gallery.append(item).await? {
        SaveOutcome::Saved(item) => {
            tracing::info!(item_id = %item.id, "saved gallery item");
            state.gallery_bus.publish(item.clone());
            Ok((
                StatusCode::CREATED,
                Json(DataResponse::new(SaveResponse {
                    saved: true,
                    message: "Image saved to gallery",
                    item: Some(item),
                })),
            ))
        }
        SaveOutcome::AlreadySaved => Ok((
            StatusCode::OK,
            Json(DataResponse::new(SaveResponse {
                saved: false,
                message: "Image already saved to gallery",
                item: None,
            })),
        )),
    }
}
