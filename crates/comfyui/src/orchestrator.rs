//! Generation orchestration.
//!
//! [`GenerationOrchestrator::submit`] registers a `queued` record and drives
//! the job in a background task: connect, submit, track, retrieve the image,
//! store it. Every outcome, including a panic inside the job task, ends in a
//! terminal record, so status subscribers always see the job finish.

use std::sync::Arc;

use keyforge_core::error::GenerationError;
use keyforge_core::generation::{GenerationRecord, GenerationUpdate, ImageRef, RecordUpdate};
use keyforge_core::storage::ArtifactStorage;
use keyforge_core::store::GenerationStore;
use keyforge_core::types::GenerationId;

use crate::engine::RenderEngine;
use crate::tracker::ProgressTracker;

/// Starts generations and writes their lifecycle into the store.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    store: Arc<GenerationStore>,
    engine: Arc<dyn RenderEngine>,
    storage: Arc<dyn ArtifactStorage>,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<GenerationStore>,
        engine: Arc<dyn RenderEngine>,
        storage: Arc<dyn ArtifactStorage>,
    ) -> Self {
        Self {
            store,
            engine,
            storage,
        }
    }

    /// Register a new generation and start it in the background.
    ///
    /// Returns as soon as the `queued` record exists; the caller can
    /// subscribe to its status immediately.
    pub async fn submit(&self, workflow: serde_json::Value) -> GenerationId {
        let id = GenerationId::new_v4();
        self.store.put(GenerationRecord::queued(id)).await;
        tracing::info!(generation_id = %id, "Generation queued");

        self.spawn(id, workflow);
        id
    }

    /// Run the job on a child task and turn an abnormal exit into a failed
    /// record.
    fn spawn(&self, id: GenerationId, workflow: serde_json::Value) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let worker = supervisor.clone();
            let outcome = tokio::spawn(async move { worker.run(id, workflow).await }).await;

            if let Err(e) = outcome {
                tracing::error!(generation_id = %id, error = %e, "Generation task aborted");
                supervisor
                    .store
                    .merge(&id, RecordUpdate::failed(format!("Generation task failed: {e}")))
                    .await;
            }
        });
    }

    /// Drive one generation to a terminal record.
    ///
    /// The record for `id` must already exist in `queued` state.
    pub async fn run(&self, id: GenerationId, workflow: serde_json::Value) {
        if let Err(e) = self.execute(id, &workflow).await {
            tracing::error!(generation_id = %id, error = %e, "Generation failed");
            self.store.merge(&id, RecordUpdate::failed(e.to_string())).await;
        }
    }

    async fn execute(
        &self,
        id: GenerationId,
        workflow: &serde_json::Value,
    ) -> Result<(), GenerationError> {
        let client_id = id.to_string();

        // Listen before submitting so no early event is missed.
        let events = self.engine.connect(&client_id).await?;
        let prompt_id = self.engine.submit(workflow, &client_id).await?;

        tracing::info!(generation_id = %id, prompt_id = %prompt_id, "Workflow submitted");
        self.store
            .merge(
                &id,
                RecordUpdate::Submitted {
                    prompt_id: prompt_id.clone(),
                },
            )
            .await;

        let mut tracker = ProgressTracker::new(events, prompt_id);
        while let Some(update) = tracker.next_update().await {
            match update {
                GenerationUpdate::Progress {
                    progress,
                    step,
                    total_steps,
                } => {
                    tracing::debug!(generation_id = %id, step, total_steps, "Generation progress");
                    self.store
                        .merge(
                            &id,
                            RecordUpdate::Progress {
                                progress,
                                step,
                                total_steps,
                            },
                        )
                        .await;
                }
                GenerationUpdate::Complete { image_ref: None } => {
                    tracing::info!(generation_id = %id, "Generation complete (no image output)");
                    self.store
                        .merge(
                            &id,
                            RecordUpdate::Completed {
                                image_ref: None,
                                image_location: None,
                            },
                        )
                        .await;
                    return Ok(());
                }
                GenerationUpdate::Complete {
                    image_ref: Some(image),
                } => {
                    // The record stays `generating` until the image is stored.
                    let location = self.retrieve(&id, &image).await?;
                    tracing::info!(generation_id = %id, location = %location, "Generation complete");
                    self.store
                        .merge(
                            &id,
                            RecordUpdate::Completed {
                                image_ref: Some(image),
                                image_location: Some(location),
                            },
                        )
                        .await;
                    return Ok(());
                }
                GenerationUpdate::Error { message } => {
                    tracing::warn!(generation_id = %id, error = %message, "Generation failed on engine");
                    self.store
                        .merge(
                            &id,
                            RecordUpdate::Failed {
                                message,
                                reset_progress: true,
                            },
                        )
                        .await;
                    return Ok(());
                }
            }
        }

        Err(GenerationError::ConnectionLost(
            "tracking ended without a terminal event".to_string(),
        ))
    }

    async fn retrieve(&self, id: &GenerationId, image: &ImageRef) -> Result<String, GenerationError> {
        let bytes = self.engine.fetch_image(image).await?;
        self.storage
            .store(id, &bytes)
            .await
            .map_err(|e| GenerationError::Retrieval(e.to_string()))
    }
}
