//! Generation record model and its state machine.
//!
//! A [`GenerationRecord`] follows `queued -> generating -> {complete, error}`
//! (plus `queued -> error` when submission fails). The per-state payload lives
//! in [`GenerationState`], so fields that only make sense in one state (an
//! image location, an error message) cannot appear in another.

use serde::{Deserialize, Serialize};

use crate::types::{GenerationId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Flat lifecycle status, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Queued,
    Generating,
    Complete,
    Error,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// `complete` and `error` accept no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of an output image inside the engine's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
}

// ---------------------------------------------------------------------------
// Canonical tracker updates
// ---------------------------------------------------------------------------

/// Normalized progress event produced by a tracker for one job.
///
/// `Complete` and `Error` are terminal: a tracker yields nothing after them.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationUpdate {
    /// Sampling progress; `progress == step / total_steps`.
    Progress {
        progress: f64,
        step: u32,
        total_steps: u32,
    },
    /// Execution finished, with the last captured output image if any.
    Complete { image_ref: Option<ImageRef> },
    /// Execution failed.
    Error { message: String },
}

impl GenerationUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// State-specific payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Queued,
    Generating {
        progress: f64,
        step: Option<u32>,
        total_steps: Option<u32>,
    },
    Complete {
        image_ref: Option<ImageRef>,
        image_location: Option<String>,
    },
    Error {
        progress: f64,
        message: String,
    },
}

impl GenerationState {
    pub fn status(&self) -> GenerationStatus {
        match self {
            Self::Queued => GenerationStatus::Queued,
            Self::Generating { .. } => GenerationStatus::Generating,
            Self::Complete { .. } => GenerationStatus::Complete,
            Self::Error { .. } => GenerationStatus::Error,
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            Self::Queued => 0.0,
            Self::Generating { progress, .. } | Self::Error { progress, .. } => *progress,
            Self::Complete { .. } => 1.0,
        }
    }
}

/// Field-level change applied to a stored record by its orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// The engine accepted the workflow.
    Submitted { prompt_id: String },
    /// Sampling progress.
    Progress {
        progress: f64,
        step: u32,
        total_steps: u32,
    },
    /// Execution finished and the artifact (if any) has been handled.
    Completed {
        image_ref: Option<ImageRef>,
        image_location: Option<String>,
    },
    /// The job failed. `reset_progress` zeroes the progress instead of
    /// keeping the last reported value.
    Failed {
        message: String,
        reset_progress: bool,
    },
}

impl RecordUpdate {
    /// A failure that keeps whatever progress was last recorded.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            reset_progress: false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Rejected state-machine transitions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("record is already {0}; no further updates are accepted")]
    Terminal(GenerationStatus),

    #[error("cannot apply {update} while {status}")]
    Invalid {
        status: GenerationStatus,
        update: &'static str,
    },
}

/// Lifecycle record of one generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub id: GenerationId,
    /// Identifier the engine assigned after submission.
    pub prompt_id: Option<String>,
    pub state: GenerationState,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationRecord {
    /// A freshly submitted job: `queued`, progress 0.
    pub fn queued(id: GenerationId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            prompt_id: None,
            state: GenerationState::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> GenerationStatus {
        self.state.status()
    }

    pub fn progress(&self) -> f64 {
        self.state.progress()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Apply `update` if the state machine allows it.
    ///
    /// Progress never decreases while generating: a lower value (e.g. a
    /// second sampler node starting from step 1) updates the step counters
    /// but keeps the higher fraction.
    pub fn apply(&mut self, update: RecordUpdate) -> Result<(), TransitionError> {
        let status = self.status();
        if status.is_terminal() {
            return Err(TransitionError::Terminal(status));
        }

        let next = match (&self.state, update) {
            (GenerationState::Queued, RecordUpdate::Submitted { prompt_id }) => {
                self.prompt_id = Some(prompt_id);
                GenerationState::Generating {
                    progress: 0.0,
                    step: None,
                    total_steps: None,
                }
            }
            (
                GenerationState::Generating { progress, .. },
                RecordUpdate::Progress {
                    progress: reported,
                    step,
                    total_steps,
                },
            ) => GenerationState::Generating {
                progress: progress.max(reported.clamp(0.0, 1.0)),
                step: Some(step),
                total_steps: Some(total_steps),
            },
            (
                GenerationState::Generating { .. },
                RecordUpdate::Completed {
                    image_ref,
                    image_location,
                },
            ) => GenerationState::Complete {
                image_ref,
                image_location,
            },
            (
                current,
                RecordUpdate::Failed {
                    message,
                    reset_progress,
                },
            ) => GenerationState::Error {
                progress: if reset_progress {
                    0.0
                } else {
                    current.progress()
                },
                message,
            },
            (_, other) => {
                return Err(TransitionError::Invalid {
                    status,
                    update: other.kind(),
                })
            }
        };

        self.state = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn generating() -> GenerationRecord {
        let mut record = GenerationRecord::queued(GenerationId::new_v4());
        record
            .apply(RecordUpdate::Submitted {
                prompt_id: "p-1".into(),
            })
            .unwrap();
        record
    }

    fn progress(step: u32, total_steps: u32) -> RecordUpdate {
        RecordUpdate::Progress {
            progress: step as f64 / total_steps as f64,
            step,
            total_steps,
        }
    }

    #[test]
    fn new_record_is_queued_at_zero() {
        let record = GenerationRecord::queued(GenerationId::new_v4());
        assert_eq!(record.status(), GenerationStatus::Queued);
        assert_eq!(record.progress(), 0.0);
        assert!(record.prompt_id.is_none());
    }

    #[test]
    fn submission_moves_to_generating() {
        let record = generating();
        assert_eq!(record.status(), GenerationStatus::Generating);
        assert_eq!(record.prompt_id.as_deref(), Some("p-1"));
    }

    #[test]
    fn progress_updates_step_counters() {
        let mut record = generating();
        record.apply(progress(5, 25)).unwrap();
        assert_eq!(
            record.state,
            GenerationState::Generating {
                progress: 0.2,
                step: Some(5),
                total_steps: Some(25),
            }
        );
    }

    #[test]
    fn progress_never_decreases() {
        let mut record = generating();
        record.apply(progress(20, 25)).unwrap();
        record.apply(progress(1, 10)).unwrap();
        assert_eq!(record.progress(), 0.8);
        assert_matches!(
            record.state,
            GenerationState::Generating {
                step: Some(1),
                total_steps: Some(10),
                ..
            }
        );
    }

    #[test]
    fn completion_forces_full_progress() {
        let mut record = generating();
        record.apply(progress(3, 25)).unwrap();
        record
            .apply(RecordUpdate::Completed {
                image_ref: None,
                image_location: None,
            })
            .unwrap();
        assert_eq!(record.status(), GenerationStatus::Complete);
        assert_eq!(record.progress(), 1.0);
    }

    #[test]
    fn queued_can_fail_directly() {
        let mut record = GenerationRecord::queued(GenerationId::new_v4());
        record.apply(RecordUpdate::failed("engine unreachable")).unwrap();
        assert_eq!(
            record.state,
            GenerationState::Error {
                progress: 0.0,
                message: "engine unreachable".into(),
            }
        );
    }

    #[test]
    fn failure_keeps_or_resets_progress() {
        let mut kept = generating();
        kept.apply(progress(10, 20)).unwrap();
        kept.apply(RecordUpdate::failed("disk full")).unwrap();
        assert_eq!(kept.progress(), 0.5);

        let mut reset = generating();
        reset.apply(progress(10, 20)).unwrap();
        reset
            .apply(RecordUpdate::Failed {
                message: "CUDA out of memory".into(),
                reset_progress: true,
            })
            .unwrap();
        assert_eq!(reset.progress(), 0.0);
    }

    #[test]
    fn terminal_records_reject_updates() {
        let mut record = generating();
        record.apply(RecordUpdate::failed("boom")).unwrap();

        let err = record.apply(progress(1, 2)).unwrap_err();
        assert_eq!(err, TransitionError::Terminal(GenerationStatus::Error));

        let err = record
            .apply(RecordUpdate::Completed {
                image_ref: None,
                image_location: None,
            })
            .unwrap_err();
        assert_eq!(err, TransitionError::Terminal(GenerationStatus::Error));
    }

    #[test]
    fn queued_rejects_progress_and_completion() {
        let mut record = GenerationRecord::queued(GenerationId::new_v4());
        assert_matches!(
            record.apply(progress(1, 2)),
            Err(TransitionError::Invalid {
                status: GenerationStatus::Queued,
                update: "progress",
            })
        );
        assert_matches!(
            record.apply(RecordUpdate::Completed {
                image_ref: None,
                image_location: None,
            }),
            Err(TransitionError::Invalid { .. })
        );
        assert_eq!(record.status(), GenerationStatus::Queued);
    }

    #[test]
    fn generating_rejects_second_submission() {
        let mut record = generating();
        assert_matches!(
            record.apply(RecordUpdate::Submitted {
                prompt_id: "p-2".into(),
            }),
            Err(TransitionError::Invalid { .. })
        );
        assert_eq!(record.prompt_id.as_deref(), Some("p-1"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(GenerationStatus::Generating).unwrap(),
            serde_json::json!("generating")
        );
    }
}
