//! Route tree.
//!
//! ```text
//! GET  /health
//! GET  /api/proxy
//!
//! POST /api/v1/runs
//! GET  /api/v1/runs/{id}
//! PUT  /api/v1/runs/{id}/garment
//! POST /api/v1/runs/{id}/generate-models
//! POST /api/v1/runs/{id}/example-models
//! POST /api/v1/runs/{id}/resume-models
//! POST /api/v1/runs/{id}/select
//! POST /api/v1/runs/{id}/try-on
//! POST /api/v1/runs/{id}/background
//! POST /api/v1/runs/{id}/tag
//! POST /api/v1/runs/{id}/next
//! POST /api/v1/runs/{id}/previous
//!
//! GET  /api/v1/gallery
//! POST /api/v1/gallery
//! ```

pub mod health;

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{gallery, pipeline};
use crate::state::AppState;

/// Everything nested under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", post(pipeline::create_run))
        .route("/runs/{id}", get(pipeline::get_run))
        .route("/runs/{id}/garment", put(pipeline::update_garment))
        .route(
            "/runs/{id}/generate-models",
            post(pipeline::generate_models),
        )
        .route(
            "/runs/{id}/example-models",
            post(pipeline::load_example_models),
        )
        .route("/runs/{id}/resume-models", post(pipeline::resume_models))
        .route("/runs/{id}/select", post(pipeline::select))
        .route("/runs/{id}/try-on", post(pipeline::run_try_on))
        .route("/runs/{id}/background", post(pipeline::run_background))
        .route("/runs/{id}/tag", post(pipeline::run_tagging))
        .route("/runs/{id}/next", post(pipeline::advance))
        .route("/runs/{id}/previous", post(pipeline::retreat))
        .route(
            "/gallery",
            get(gallery::list_gallery).post(gallery::save_to_gallery),
        )
}
