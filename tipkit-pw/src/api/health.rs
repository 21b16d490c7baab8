//! Health check endpoint
//!
//! Cheap by contract: answers without touching the models, so the
//! coordinator's wake poll can't be slowed down by inference in progress.

use axum::{routing::get, Json, Router};
use tipkit_common::api::HealthResponse;

use crate::AppState;

/// GET|POST /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "tipkit-pw".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check).post(health_check))
}
