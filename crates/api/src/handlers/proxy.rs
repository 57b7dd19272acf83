//! The image proxy the variant grids point their relative URLs at.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, Response, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

/// GET /api/proxy?url=...
///
/// Fetch a remote image and stream it back with the upstream content
/// type. Kept at its historical un-versioned path because stored
/// variant URLs embed it.
pub async fn proxy_image(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> AppResult<Response<Body>> {
    if !query.url.starts_with("http://") && !query.url.starts_with("https://") {
        return Err(AppError::BadRequest(
            "url must be an absolute http(s) URL".to_string(),
        ));
    }

    let upstream = state
        .http
        .get(&query.url)
        .send()
        .await
        .map_err(|err| AppError::Upstream(format!("Proxy fetch failed: {err}")))?;

    if !upstream.status().is_success() {
        return Err(AppError::Upstream(format!(
            "Upstream answered {} for the proxied image",
            upstream.status()
        )));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|err| AppError::Internal(err.to_string()))
}
