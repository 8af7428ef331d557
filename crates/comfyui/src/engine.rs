//! Rendering-engine seam used by the orchestrator.
//!
//! [`RenderEngine`] covers the four calls a generation needs: open the
//! per-job event connection, submit the workflow, download the output, and
//! a health check. [`ComfyUIEngine`] implements it on top of
//! [`ComfyUIClient`] and [`ComfyUIApi`]; tests substitute scripted engines.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use keyforge_core::error::GenerationError;
use keyforge_core::generation::ImageRef;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::api::ComfyUIApi;
use crate::client::ComfyUIClient;

/// Frames received on a job's event connection.
pub type EventStream = BoxStream<'static, Result<Message, WsError>>;

#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Open a dedicated event connection registered under `client_id`.
    async fn connect(&self, client_id: &str) -> Result<EventStream, GenerationError>;

    /// Queue `workflow` for execution; returns the engine's prompt id.
    async fn submit(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, GenerationError>;

    /// Download an output image.
    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, GenerationError>;

    async fn is_healthy(&self) -> bool;
}

/// [`RenderEngine`] backed by a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIEngine {
    client: ComfyUIClient,
    api: ComfyUIApi,
}

impl ComfyUIEngine {
    /// * `api_url` - HTTP base URL; the WebSocket URL is derived from it.
    pub fn new(api_url: &str) -> Self {
        Self {
            client: ComfyUIClient::from_api_url(api_url),
            api: ComfyUIApi::new(api_url.to_string()),
        }
    }
}

#[async_trait]
impl RenderEngine for ComfyUIEngine {
    async fn connect(&self, client_id: &str) -> Result<EventStream, GenerationError> {
        let ws_stream = self
            .client
            .connect(client_id)
            .await
            .map_err(|e| GenerationError::Submission(e.to_string()))?;
        Ok(ws_stream.boxed())
    }

    async fn submit(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<String, GenerationError> {
        let response = self
            .api
            .submit_workflow(workflow, client_id)
            .await
            .map_err(|e| GenerationError::Submission(e.to_string()))?;

        tracing::debug!(
            prompt_id = %response.prompt_id,
            queue_position = response.number,
            "Workflow queued on ComfyUI",
        );
        Ok(response.prompt_id)
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, GenerationError> {
        self.api
            .get_image(image)
            .await
            .map_err(|e| GenerationError::Retrieval(e.to_string()))
    }

    async fn is_healthy(&self) -> bool {
        self.api.is_healthy().await
    }
}
