//! Core traits for stage collaborators
//!
//! All production backends implement [`StageExecutor`] to provide a unified
//! interface regardless of the underlying service (LLM analysis, TTS, image
//! or video synthesis, composition).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use storyreel_core::{FailureKind, TaskId, TaskKind};

/// Inputs handed to a stage collaborator for one task execution
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// The task being executed
    pub task: TaskId,
    /// Stage kind
    pub kind: TaskKind,
    /// Scene number, for per-scene stages
    pub scene: Option<u32>,
    /// The job's input document
    pub input: PathBuf,
    /// Artifacts produced by this task's predecessors
    pub upstream: Vec<PathBuf>,
    /// Scratch directory where the stage writes its artifact
    pub workdir: PathBuf,
    /// Final output destination (used by the last assembly stage)
    pub output: PathBuf,
    /// Execution window granted to this attempt
    pub deadline: Duration,
}

/// Result of a successful stage execution
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Path to the produced artifact
    pub artifact: PathBuf,
}

/// A failure reported by a stage collaborator
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Network or rate-limit failure; the attempt may be retried
    #[error("transient stage failure: {0}")]
    Transient(String),

    /// Invalid input or unsupported content; retrying cannot help
    #[error("permanent stage failure: {0}")]
    Permanent(String),
}

impl StageError {
    /// Map this error onto the engine's failure taxonomy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transient(_) => FailureKind::Transient,
            Self::Permanent(_) => FailureKind::Permanent,
        }
    }
}

/// An opaque asynchronous stage operation.
///
/// Implementations may consume billable API quota; the engine guarantees a
/// task is never double-invoked while leased elsewhere.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Execute the stage, producing an artifact or a classified failure
    async fn execute(&self, request: StageRequest) -> Result<StageOutput, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_classification() {
        assert_eq!(
            StageError::Transient("429".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            StageError::Permanent("unsupported".into()).failure_kind(),
            FailureKind::Permanent
        );
    }
}
