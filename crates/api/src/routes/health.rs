use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    gallery: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gallery = state.gallery.list_all().await.is_ok();
    Json(HealthResponse {
        status: if gallery { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        gallery,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
