//! Handlers for photoshoot runs: creation, garment editing, the five
//! fan-out batches, selections, and stage navigation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use lookbook_core::garment::GarmentInfo;
use lookbook_core::settings::{
    BackgroundParameters, GenerationSettings, TaggingParameters, TryOnParameters,
};
use lookbook_core::stage::Stage;
use lookbook_core::types::CombinationKey;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Stock model images used by the example shortcut when the caller
/// does not supply their own.
const EXAMPLE_MODEL_URLS: [&str; 4] = [
    "https://aem.johnnywas.com/is/image/oxf/l14724-1_denimprint_1?$sfPDP3x$",
    "https://aem.johnnywas.com/is/image/oxf/B_2-up%20images%20_%20CTA_1-1-9?$2UpImagesandCopyComponent_1536x2306_D$&qlt-70",
    "https://i.ibb.co/MkNtTc1X/B-2-up-images-CTA-1-2-7-1.jpg",
    "https://aem.johnnywas.com/is/image/oxf/l38025-1_kasumi_1?$sfPDP3x$",
];

#[derive(Debug, Default, Deserialize)]
pub struct CreateRunRequest {
    #[serde(default)]
    pub garment: GarmentInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    pub stage: Stage,
    pub key: CombinationKey,
    pub image_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExampleModelsRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// POST /api/v1/runs
///
/// Start a photoshoot. The try-on seed is drawn once here so every
/// try-on in the run shares it.
pub async fn create_run(
    State(state): State<AppState>,
    body: Option<Json<CreateRunRequest>>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = body.unwrap_or_default();
    let seed: u32 = rand::rng().random();
    let snapshot = state.orchestrator.create_run(request.garment, seed).await;
    tracing::info!(run_id = %snapshot.run.id, "created run");
    Ok((StatusCode::CREATED, Json(DataResponse::new(snapshot))))
}

/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.snapshot(id).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// PUT /api/v1/runs/{id}/garment
pub async fn update_garment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(garment): Json<GarmentInfo>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.update_garment(id, garment).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/generate-models
///
/// Stage-1 fan-out over all nine body-size x skin-tone combinations.
/// Blocks until the batch settles, which can take minutes.
pub async fn generate_models(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(settings): Json<GenerationSettings>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.generate_models(id, settings).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/example-models
///
/// Skip generation and fill the grid with example images.
pub async fn load_example_models(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ExampleModelsRequest>>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = body.unwrap_or_default();
    let urls = if request.urls.is_empty() {
        EXAMPLE_MODEL_URLS.iter().map(|u| u.to_string()).collect()
    } else {
        request.urls
    };
    let snapshot = state.orchestrator.load_example_models(id, urls).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/resume-models
///
/// Keep waiting on model generation jobs that previously timed out.
pub async fn resume_models(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.resume_models(id).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/select
pub async fn select(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectRequest>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .orchestrator
        .select(id, request.stage, request.key, request.image_url)
        .await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/try-on
///
/// Stage-3 fan-out: dress every selected model. Parameters are
/// optional; omitting them keeps the run's current ones.
pub async fn run_try_on(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TryOnParameters>>,
) -> AppResult<impl IntoResponse> {
    let parameters = body.map(|Json(p)| p);
    let snapshot = state.orchestrator.run_try_on(id, parameters).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/background
pub async fn run_background(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(parameters): Json<BackgroundParameters>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.run_background(id, parameters).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/tag
pub async fn run_tagging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TaggingParameters>>,
) -> AppResult<impl IntoResponse> {
    let parameters = body.map(|Json(p)| p);
    let snapshot = state.orchestrator.run_tagging(id, parameters).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/next
pub async fn advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.advance(id).await?;
    Ok(Json(DataResponse::new(snapshot)))
}

/// POST /api/v1/runs/{id}/previous
pub async fn retreat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.retreat(id).await?;
    Ok(Json(DataResponse::new(snapshot)))
}
