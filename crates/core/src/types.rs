/// Process-unique identifier of one generation job.
pub type GenerationId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
