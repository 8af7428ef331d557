//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket URL of one ComfyUI server.
//! Call [`ComfyUIClient::connect`] to open a live [`ComfyUIStream`]
//! for a given client id. ComfyUI routes execution messages for prompts
//! submitted with that client id to this socket only.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Raw WebSocket stream type used for ComfyUI connections.
pub type ComfyUIStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// Build a client from the instance's HTTP base URL.
    pub fn from_api_url(api_url: &str) -> Self {
        Self::new(ws_url_from_api_url(api_url))
    }

    /// Connect to the ComfyUI WebSocket endpoint as `client_id`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIStream, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ws_stream)
    }
}

/// Swap the scheme of an HTTP base URL for its WebSocket counterpart
/// (`http` -> `ws`, `https` -> `wss`). Trailing slashes are dropped.
pub fn ws_url_from_api_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
