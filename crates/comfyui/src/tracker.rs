//! Per-job progress tracking over a ComfyUI event connection.
//!
//! [`ProgressTracker`] reads raw frames from one job's WebSocket, keeps only
//! the messages that belong to its prompt, and turns them into canonical
//! [`GenerationUpdate`]s. The sequence is finite: it ends with exactly one
//! `Complete` or `Error`, after which the connection is dropped.

use futures::{Stream, StreamExt};
use keyforge_core::error::GenerationError;
use keyforge_core::generation::{GenerationUpdate, ImageRef};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::messages::{parse_message, ComfyUIMessage};

/// Turns one job's ComfyUI push messages into [`GenerationUpdate`]s.
pub struct ProgressTracker<S> {
    /// `None` once a terminal update has been produced.
    events: Option<S>,
    prompt_id: String,
    /// Most recent output image reported for the prompt.
    image_ref: Option<ImageRef>,
}

impl<S> ProgressTracker<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    pub fn new(events: S, prompt_id: impl Into<String>) -> Self {
        Self {
            events: Some(events),
            prompt_id: prompt_id.into(),
            image_ref: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.events.is_none()
    }

    /// Wait for the next update.
    ///
    /// Returns `None` only after the terminal update has been returned.
    pub async fn next_update(&mut self) -> Option<GenerationUpdate> {
        loop {
            let events = self.events.as_mut()?;
            let update = match events.next().await {
                Some(Ok(frame)) => self.handle_frame(frame),
                Some(Err(e)) => Some(failure(GenerationError::ConnectionLost(e.to_string()))),
                None => Some(failure(GenerationError::ConnectionLost(
                    "event stream ended before execution finished".to_string(),
                ))),
            };

            if let Some(update) = update {
                if update.is_terminal() {
                    self.finish(&update);
                }
                return Some(update);
            }
        }
    }

    fn finish(&mut self, update: &GenerationUpdate) {
        tracing::debug!(
            prompt_id = %self.prompt_id,
            ?update,
            "Tracking finished, closing event connection",
        );
        self.events = None;
    }

    fn handle_frame(&mut self, frame: Message) -> Option<GenerationUpdate> {
        match frame {
            Message::Text(text) => self.handle_text(&text),
            Message::Binary(_) => {
                // ComfyUI sends binary messages for preview images.
                tracing::trace!(prompt_id = %self.prompt_id, "Ignoring binary message (preview image)");
                None
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
            Message::Close(frame) => {
                let detail = match frame {
                    Some(frame) => format!(
                        "closed by server (code {}): {}",
                        u16::from(frame.code),
                        frame.reason
                    ),
                    None => "closed by server".to_string(),
                };
                Some(failure(GenerationError::ConnectionLost(detail)))
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> Option<GenerationUpdate> {
        let message = match parse_message(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::trace!(prompt_id = %self.prompt_id, "Ignoring unhandled ComfyUI message");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    prompt_id = %self.prompt_id,
                    error = %e,
                    raw_message = %text,
                    "Failed to parse ComfyUI message",
                );
                return Some(failure(GenerationError::Protocol(e.to_string())));
            }
        };

        match message {
            ComfyUIMessage::Progress(data) => {
                // Progress messages without a prompt id belong to this connection.
                if !self.is_tracked(data.prompt_id.as_deref(), true) {
                    return None;
                }
                match data.fraction() {
                    Some(progress) => {
                        tracing::trace!(
                            prompt_id = %self.prompt_id,
                            node = ?data.node,
                            value = data.value,
                            max = data.max,
                            "Sampling progress",
                        );
                        Some(GenerationUpdate::Progress {
                            progress,
                            step: data.value,
                            total_steps: data.max,
                        })
                    }
                    None => {
                        tracing::warn!(
                            prompt_id = %self.prompt_id,
                            value = data.value,
                            max = data.max,
                            "Ignoring malformed progress message",
                        );
                        None
                    }
                }
            }
            ComfyUIMessage::Executed(data) => {
                if self.is_tracked(data.prompt_id.as_deref(), false) {
                    if let Some(image) = data.first_image() {
                        tracing::info!(
                            prompt_id = %self.prompt_id,
                            node = %data.node,
                            filename = %image.filename,
                            "Image output captured",
                        );
                        if let Some(previous) = self.image_ref.replace(image) {
                            tracing::debug!(
                                prompt_id = %self.prompt_id,
                                replaced = %previous.filename,
                                "Earlier image output replaced",
                            );
                        }
                    }
                }
                None
            }
            ComfyUIMessage::Executing(data) => {
                if !self.is_tracked(data.prompt_id.as_deref(), false) {
                    return None;
                }
                match data.node {
                    Some(node) => {
                        tracing::trace!(prompt_id = %self.prompt_id, node = %node, "Executing node");
                        None
                    }
                    None => {
                        tracing::info!(prompt_id = %self.prompt_id, "Execution completed (all nodes done)");
                        Some(GenerationUpdate::Complete {
                            image_ref: self.image_ref.take(),
                        })
                    }
                }
            }
            ComfyUIMessage::ExecutionError(data) => {
                if !self.is_tracked(data.prompt_id.as_deref(), false) {
                    return None;
                }
                tracing::error!(
                    prompt_id = %self.prompt_id,
                    node_id = ?data.node_id,
                    error_type = ?data.exception_type,
                    "ComfyUI execution error",
                );
                Some(failure(GenerationError::EngineExecution(data.message())))
            }
            ComfyUIMessage::Status(data) => {
                tracing::trace!(
                    queue_remaining = data.status.exec_info.queue_remaining,
                    sid = ?data.sid,
                    "ComfyUI queue status",
                );
                None
            }
            ComfyUIMessage::ExecutionStart(data) => {
                if self.is_tracked(Some(&data.prompt_id), false) {
                    tracing::debug!(prompt_id = %self.prompt_id, "Execution started");
                }
                None
            }
            ComfyUIMessage::ExecutionCached(data) => {
                if self.is_tracked(Some(&data.prompt_id), false) {
                    tracing::debug!(
                        prompt_id = %self.prompt_id,
                        cached_nodes = data.nodes.len(),
                        "Cached node outputs reused",
                    );
                }
                None
            }
        }
    }

    /// Whether a message tagged with `prompt_id` belongs to this tracker.
    /// `untagged_matches` decides for messages without a prompt id.
    fn is_tracked(&self, prompt_id: Option<&str>, untagged_matches: bool) -> bool {
        match prompt_id {
            Some(id) => id == self.prompt_id,
            None => untagged_matches,
        }
    }
}

fn failure(error: GenerationError) -> GenerationUpdate {
    GenerationUpdate::Error {
        message: error.to_string(),
    }
}
