//! ComfyUI integration: message parsing, WebSocket and REST clients,
//! per-job progress tracking, and the orchestrator that drives a
//! generation from submission to a stored image.

pub mod api;
pub mod client;
pub mod engine;
pub mod messages;
pub mod orchestrator;
pub mod tracker;
