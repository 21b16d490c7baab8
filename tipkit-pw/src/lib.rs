//! tipkit-pw library interface
//!
//! Exposes the router, state, and model seams for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod lang;
pub mod models;
pub mod net;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use models::ModelRuntime;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Process-wide model state, loaded once at startup
    pub runtime: Arc<ModelRuntime>,
}

impl AppState {
    pub fn new(runtime: Arc<ModelRuntime>) -> Self {
        Self { runtime }
    }
}

/// Build application router
///
/// - `GET|POST /health` - readiness, no model access
/// - `POST /detect-language`, `/translate`, `/embed` - single-item wrappers
/// - `POST /process-batch` - the coordinator's steady-state endpoint
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::process_routes())
        .with_state(state)
}
