#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures along one job's pipeline, from submission to artifact storage.
///
/// Every variant ends up as the `message` of a terminal error record, so the
/// `Display` text is what a client eventually reads.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// The engine was unreachable or rejected the workflow.
    #[error("Failed to submit workflow: {0}")]
    Submission(String),

    /// A push message could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The event connection dropped before a terminal event arrived.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The engine reported a failure while executing the workflow.
    #[error("{0}")]
    EngineExecution(String),

    /// Fetching or storing the finished image failed.
    #[error("Failed to retrieve image: {0}")]
    Retrieval(String),
}
