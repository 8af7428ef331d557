//! Generation tracking core: record model, state store, status relay and
//! image storage shared by the ComfyUI bridge and the HTTP API.

pub mod error;
pub mod generation;
pub mod relay;
pub mod storage;
pub mod store;
pub mod types;
