//! Pull-driven status relay.
//!
//! [`status_events`] polls one generation's record on a fixed interval and
//! yields a [`StatusEvent`] only when the progress changed since the last
//! event or the record reached a terminal state. The stream ends right after
//! its terminal event. It only ever reads the store, so dropping it (client
//! disconnect) has no effect on the generation itself.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;

use crate::generation::{GenerationRecord, GenerationState, GenerationStatus};
use crate::store::GenerationStore;
use crate::types::GenerationId;

/// Default delay between two reads of the record.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Message of the event sent for an unknown generation id.
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// One status update as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub status: GenerationStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    /// Terminal event for a generation the store does not know.
    pub fn not_found() -> Self {
        Self {
            status: GenerationStatus::Error,
            progress: 0.0,
            step: None,
            total_steps: None,
            image_url: None,
            message: Some(NOT_FOUND_MESSAGE.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<&GenerationRecord> for StatusEvent {
    fn from(record: &GenerationRecord) -> Self {
        let mut event = Self {
            status: record.status(),
            progress: record.progress(),
            step: None,
            total_steps: None,
            image_url: None,
            message: None,
        };
        match &record.state {
            GenerationState::Queued => {}
            GenerationState::Generating {
                step, total_steps, ..
            } => {
                event.step = *step;
                event.total_steps = *total_steps;
            }
            GenerationState::Complete { image_location, .. } => {
                event.image_url = image_location.clone();
            }
            GenerationState::Error { message, .. } => {
                event.message = Some(message.clone());
            }
        }
        event
    }
}

struct RelayState {
    store: Arc<GenerationStore>,
    id: GenerationId,
    poll_interval: Duration,
    last_progress: Option<f64>,
    polled: bool,
    finished: bool,
}

/// Stream the status of generation `id` until it reaches a terminal state.
///
/// The first read happens immediately; later reads are `poll_interval`
/// apart. Intermediate progress values written between two reads are
/// coalesced into the latest one.
pub fn status_events(
    store: Arc<GenerationStore>,
    id: GenerationId,
    poll_interval: Duration,
) -> impl Stream<Item = StatusEvent> + Send + 'static {
    let state = RelayState {
        store,
        id,
        poll_interval,
        last_progress: None,
        polled: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            if state.polled {
                tokio::time::sleep(state.poll_interval).await;
            }
            state.polled = true;

            let Some(record) = state.store.get(&state.id).await else {
                tracing::debug!(generation_id = %state.id, "Status requested for unknown generation");
                state.finished = true;
                return Some((StatusEvent::not_found(), state));
            };

            let event = StatusEvent::from(&record);
            if event.is_terminal() || state.last_progress != Some(event.progress) {
                state.last_progress = Some(event.progress);
                state.finished = event.is_terminal();
                return Some((event, state));
            }
        }
    })
}
