use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderName;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use keyforge_core::relay::{status_events, StatusEvent};

use crate::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// GET /api/status/{id} -- server-sent status events until the generation
/// reaches a terminal state.
///
/// Unknown (or malformed) ids get a single `error` event with the message
/// `Not found`.
async fn stream_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let events: BoxStream<'static, StatusEvent> = match id.parse() {
        Ok(generation_id) => status_events(
            state.store.clone(),
            generation_id,
            state.config.status_poll_interval(),
        )
        .boxed(),
        Err(_) => stream::once(async { StatusEvent::not_found() }).boxed(),
    };

    let sse = events.filter_map(move |event| {
        let id = id.clone();
        async move {
            match Event::default().json_data(&event) {
                Ok(frame) => Some(Ok::<_, Infallible>(frame)),
                Err(e) => {
                    tracing::error!(generation_id = %id, error = %e, "Failed to encode status event");
                    None
                }
            }
        }
    });

    (
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        Sse::new(sse),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/status/{id}", get(stream_status))
}
