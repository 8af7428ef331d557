use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use keyforge_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::routes::parse_generation_id;
use crate::state::AppState;

/// GET /api/images/{id} -- the stored PNG of a finished generation.
async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let generation_id = parse_generation_id(&id)?;

    let bytes = state.images.load(&generation_id).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Image",
            id,
        })
    })?;

    Ok(([(CONTENT_TYPE, "image/png")], bytes))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/images/{id}", get(get_image))
}
