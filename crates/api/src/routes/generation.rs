use axum::extract::{Path, State};
use axum::{routing::get, routing::post, Json, Router};
use keyforge_core::error::CoreError;
use keyforge_core::generation::{GenerationRecord, GenerationState, GenerationStatus};
use keyforge_core::types::{GenerationId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::routes::parse_generation_id;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /api/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// ComfyUI workflow in API format (node id -> node definition).
    pub workflow: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generation_id: GenerationId,
}

/// Point-in-time view of a generation record.
#[derive(Debug, Serialize)]
pub struct GenerationSnapshot {
    pub id: GenerationId,
    pub status: GenerationStatus,
    pub progress: f64,
    pub prompt_id: Option<String>,
    pub step: Option<u32>,
    pub total_steps: Option<u32>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<GenerationRecord> for GenerationSnapshot {
    fn from(record: GenerationRecord) -> Self {
        let status = record.status();
        let progress = record.progress();
        let (step, total_steps, image_url, error) = match record.state {
            GenerationState::Queued => (None, None, None, None),
            GenerationState::Generating {
                step, total_steps, ..
            } => (step, total_steps, None, None),
            GenerationState::Complete { image_location, .. } => (None, None, image_location, None),
            GenerationState::Error { message, .. } => (None, None, None, Some(message)),
        };

        Self {
            id: record.id,
            status,
            progress,
            prompt_id: record.prompt_id,
            step,
            total_steps,
            image_url,
            error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/generate -- queue a workflow and return its generation id.
async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    if !body.workflow.is_object() {
        return Err(AppError::BadRequest(
            "workflow must be a JSON object".to_string(),
        ));
    }

    let generation_id = state.orchestrator.submit(body.workflow).await;
    Ok(Json(GenerateResponse { generation_id }))
}

/// GET /api/generations/{id} -- current record snapshot.
async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<GenerationSnapshot>>> {
    let generation_id = parse_generation_id(&id)?;

    let record = state.store.get(&generation_id).await.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Generation",
            id,
        })
    })?;

    Ok(Json(DataResponse {
        data: record.into(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/generations/{id}", get(get_generation))
}
