#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use futures::StreamExt;
use http_body_util::BodyExt;
use keyforge_api::config::ServerConfig;
use keyforge_api::router::build_app_router;
use keyforge_api::state::AppState;
use keyforge_comfyui::engine::{EventStream, RenderEngine};
use keyforge_core::error::GenerationError;
use keyforge_core::generation::ImageRef;
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tower::ServiceExt;

pub const PROMPT_ID: &str = "prompt-1";
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\ntest-image";

// ---------------------------------------------------------------------------
// Scripted rendering engine
// ---------------------------------------------------------------------------

/// Engine that replays the same push messages for every job.
pub struct ScriptedEngine {
    pub messages: Vec<serde_json::Value>,
    pub healthy: bool,
}

impl ScriptedEngine {
    /// Two progress steps, one image output, then completion.
    pub fn successful() -> Self {
        Self {
            messages: vec![
                serde_json::json!({"type": "progress", "data": {"value": 5, "max": 25, "prompt_id": PROMPT_ID}}),
                serde_json::json!({"type": "progress", "data": {"value": 25, "max": 25, "prompt_id": PROMPT_ID}}),
                serde_json::json!({"type": "executed", "data": {
                    "node": "9",
                    "prompt_id": PROMPT_ID,
                    "output": {"images": [{"filename": "out_001.png", "subfolder": "", "type": "output"}]}
                }}),
                serde_json::json!({"type": "executing", "data": {"node": null, "prompt_id": PROMPT_ID}}),
            ],
            healthy: true,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            messages: vec![serde_json::json!({"type": "execution_error", "data": {
                "prompt_id": PROMPT_ID,
                "exception_message": message
            }})],
            healthy: true,
        }
    }
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    async fn connect(&self, _client_id: &str) -> Result<EventStream, GenerationError> {
        let frames: Vec<Result<Message, WsError>> = self
            .messages
            .iter()
            .map(|m| Ok(Message::text(m.to_string())))
            .collect();
        Ok(futures::stream::iter(frames).boxed())
    }

    async fn submit(
        &self,
        _workflow: &serde_json::Value,
        _client_id: &str,
    ) -> Result<String, GenerationError> {
        Ok(PROMPT_ID.to_string())
    }

    async fn fetch_image(&self, _image: &ImageRef) -> Result<Vec<u8>, GenerationError> {
        Ok(PNG_BYTES.to_vec())
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Router plus a handle on its state; the temp dir lives as long as the app.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _images: TempDir,
}

/// Build a test `ServerConfig` with fast polling and a private image dir.
pub fn test_config(image_output_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_url: "http://comfyui.invalid:8890".to_string(),
        image_output_dir: image_output_dir.to_path_buf(),
        status_poll_interval_ms: 10,
        record_retention_secs: 3600,
        retention_sweep_interval_secs: 60,
    }
}

/// Build the full application router (same middleware stack as `main.rs`)
/// around `engine`.
pub fn build_test_app(engine: ScriptedEngine) -> TestApp {
    let images = tempfile::tempdir().unwrap();
    let config = test_config(images.path());
    let state = AppState::new(config.clone(), Arc::new(engine));
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        _images: images,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Collect an SSE body and decode the JSON payload of every `data:` line.
pub async fn sse_events(response: Response<Body>) -> Vec<serde_json::Value> {
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}
