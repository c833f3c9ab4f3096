//! Typed rejections raised by the orchestration core.
//!
//! Every variant means the requested operation was refused and nothing was
//! written. I/O and parse failures are not represented here; they travel as
//! `anyhow` errors with path context.

use thiserror::Error;

use crate::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseGraphError {
    /// Status change outside the legal edge set (or a lost claim race).
    #[error("invalid transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task id '{0}' already exists in this iteration")]
    DuplicateId(String),

    #[error("task '{task}' declares unknown parent '{parent}'")]
    UnknownParent { task: String, parent: String },

    #[error("parent cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("phase '{phase}' has used all {max_iterations} loop iterations")]
    IterationLimitExceeded { phase: String, max_iterations: u32 },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("phase '{from}' has no declared transition to '{to}'")]
    IllegalPhaseTransition { from: String, to: String },

    #[error("phase '{phase}' cannot exit: missing artifacts {}", missing.join(", "))]
    MissingArtifacts { phase: String, missing: Vec<String> },

    #[error(
        "phase '{phase}' cannot exit: tasks {} are below confidence {min}",
        tasks.join(", ")
    )]
    ConfidenceGate {
        phase: String,
        min: u8,
        tasks: Vec<String>,
    },

    #[error("plan '{0}' reached a terminal phase")]
    PlanFinished(String),

    #[error("confidence score {0} is outside 1..=5")]
    InvalidConfidence(u8),

    #[error("plan '{0}' already exists")]
    PlanExists(String),

    #[error("active plan pointer moved (expected version {expected}, found {actual})")]
    StaleActivePointer { expected: u64, actual: u64 },
}

impl PhaseGraphError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PhaseGraphError::NotFound {
            kind,
            id: id.into(),
        }
    }
}
