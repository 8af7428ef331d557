pub mod generation;
pub mod health;
pub mod images;
pub mod status;

use axum::Router;
use keyforge_core::error::CoreError;
use keyforge_core::types::GenerationId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// POST /generate                  start a generation
/// GET  /status/{id}               SSE status stream
/// GET  /generations/{id}          record snapshot
/// GET  /images/{id}               finished image (PNG)
/// GET  /health                    service and engine health
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generation::router())
        .merge(status::router())
        .merge(images::router())
        .merge(health::router())
}

/// Parse a generation id from a path segment. Malformed ids cannot exist in
/// the store, so they are reported as not found.
pub(crate) fn parse_generation_id(raw: &str) -> AppResult<GenerationId> {
    raw.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Generation",
            id: raw.to_string(),
        })
    })
}
