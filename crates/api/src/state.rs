use std::sync::Arc;

use keyforge_comfyui::engine::RenderEngine;
use keyforge_comfyui::orchestrator::GenerationOrchestrator;
use keyforge_core::storage::LocalImageStorage;
use keyforge_core::store::GenerationStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// In-memory generation records.
    pub store: Arc<GenerationStore>,
    /// Starts generations and drives them to completion.
    pub orchestrator: GenerationOrchestrator,
    /// Rendering engine, used here only for health checks.
    pub engine: Arc<dyn RenderEngine>,
    /// Where finished images live; served by `GET /api/images/{id}`.
    pub images: Arc<LocalImageStorage>,
}

impl AppState {
    /// Wire the store, engine and image storage together.
    pub fn new(config: ServerConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let store = Arc::new(GenerationStore::new());
        let images = Arc::new(LocalImageStorage::new(config.image_output_dir.clone()));
        let orchestrator =
            GenerationOrchestrator::new(Arc::clone(&store), Arc::clone(&engine), images.clone());

        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            engine,
            images,
        }
    }
}
