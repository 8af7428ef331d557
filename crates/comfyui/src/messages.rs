//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the kinds
//! the tracker cares about into a strongly-typed [`ComfyUIMessage`] enum and
//! reports every other kind as ignorable.

use keyforge_core::generation::ImageRef;
use serde::Deserialize;
use serde_json::Value;

/// Message kinds decoded into [`ComfyUIMessage`]. Anything else (custom
/// node broadcasts, `progress_state`, ...) is skipped.
const KNOWN_MESSAGE_TYPES: &[&str] = &[
    "status",
    "execution_start",
    "execution_cached",
    "executing",
    "progress",
    "executed",
    "execution_error",
];

/// Known ComfyUI WebSocket message types.
///
/// Deserialized via the adjacently-tagged `"type"` field with associated
/// `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node has finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
    /// Client id echoed back on the first status message after connecting.
    #[serde(default)]
    pub sid: Option<String>,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `execution_start` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    /// Node IDs whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: Option<String>,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: u32,
    /// Total number of steps.
    pub max: u32,
    /// Older ComfyUI builds omit this; such messages are attributed to
    /// whichever prompt the connection is tracking.
    pub prompt_id: Option<String>,
    pub node: Option<String>,
}

impl ProgressData {
    /// `value / max`, or `None` when the pair cannot form a fraction in
    /// `[0, 1]` (`max == 0` or `value > max`).
    pub fn fraction(&self) -> Option<f64> {
        if self.max == 0 || self.value > self.max {
            return None;
        }
        Some(self.value as f64 / self.max as f64)
    }
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    /// Raw output value (images, filenames, etc.).
    pub output: Value,
    pub prompt_id: Option<String>,
}

impl ExecutedData {
    /// First image listed in the node output, if any.
    pub fn first_image(&self) -> Option<ImageRef> {
        let image = self.output.get("images")?.as_array()?.first()?;
        let filename = image.get("filename")?.as_str()?;
        let subfolder = image
            .get("subfolder")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(ImageRef {
            filename: filename.to_string(),
            subfolder: subfolder.to_string(),
        })
    }
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: Option<String>,
    pub node_id: Option<String>,
    pub exception_message: Option<String>,
    pub exception_type: Option<String>,
    /// Python traceback, usually a list of lines.
    #[serde(default)]
    pub traceback: Value,
}

impl ErrorData {
    /// Human-readable failure text: the exception message, else the
    /// traceback, else a generic fallback.
    pub fn message(&self) -> String {
        if let Some(message) = &self.exception_message {
            return message.clone();
        }
        match &self.traceback {
            Value::String(text) if !text.is_empty() => text.clone(),
            Value::Array(lines) if !lines.is_empty() => lines
                .iter()
                .map(|line| line.as_str().map_or_else(|| line.to_string(), str::to_string))
                .collect::<Vec<_>>()
                .concat(),
            _ => "Unknown error".to_string(),
        }
    }
}

/// Parse a ComfyUI WebSocket text message.
///
/// Returns `Ok(None)` for message kinds the tracker does not use and for
/// messages without a `type`. Returns `Err` for malformed JSON or for a
/// known kind whose payload does not match its schema.
pub fn parse_message(text: &str) -> Result<Option<ComfyUIMessage>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("type").and_then(Value::as_str) {
        Some(kind) if KNOWN_MESSAGE_TYPES.contains(&kind) => serde_json::from_value(value).map(Some),
        _ => Ok(None),
    }
}
