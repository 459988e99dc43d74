//! Storyreel Core - shared types, errors, and configuration
//!
//! This crate provides the foundational types (job/task identifiers, states,
//! the stage-kind taxonomy), error handling, and configuration loading used by
//! the scheduling engine and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, Result, StoryreelError};
pub use types::{
    FailureKind, JobId, JobSpec, JobState, Priority, TaskError, TaskId, TaskKind, TaskState,
};
