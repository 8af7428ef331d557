use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `connected` when the rendering engine answers its health check.
    pub comfyui: &'static str,
}

/// GET /api/health -- service health plus rendering engine reachability.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let comfyui = if state.engine.is_healthy().await {
        "connected"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        comfyui,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
