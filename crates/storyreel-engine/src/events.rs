//! Pipeline lifecycle events
//!
//! The scheduler emits an event for every significant state transition.
//! The default sink forwards to `tracing`; tests use the collecting sink
//! to assert on ordering.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use storyreel_core::{JobId, JobState, TaskError, TaskId};

/// A significant scheduler state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    JobSubmitted {
        job: JobId,
        tasks: usize,
    },
    TaskLeased {
        task: TaskId,
        worker: String,
        attempt: u32,
    },
    TaskSucceeded {
        task: TaskId,
    },
    TaskFailed {
        task: TaskId,
        error: TaskError,
        will_retry: bool,
    },
    TaskCancelled {
        task: TaskId,
    },
    LeaseReclaimed {
        task: TaskId,
        worker: String,
        expired_at: DateTime<Utc>,
    },
    JobCompleted {
        job: JobId,
        state: JobState,
    },
}

/// Receives pipeline events as they happen
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Default sink forwarding everything to `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::JobSubmitted { job, tasks } => {
                info!(job = %job, tasks, "job submitted");
            }
            PipelineEvent::TaskLeased {
                task,
                worker,
                attempt,
            } => {
                info!(task = %task, worker, attempt, "task leased");
            }
            PipelineEvent::TaskSucceeded { task } => {
                info!(task = %task, "task succeeded");
            }
            PipelineEvent::TaskFailed {
                task,
                error,
                will_retry,
            } => {
                warn!(task = %task, kind = %error.kind, error = %error.message, will_retry, "task failed");
            }
            PipelineEvent::TaskCancelled { task } => {
                info!(task = %task, "task cancelled");
            }
            PipelineEvent::LeaseReclaimed {
                task,
                worker,
                expired_at,
            } => {
                warn!(task = %task, worker, expired_at = %expired_at, "lease expired, reclaiming");
            }
            PipelineEvent::JobCompleted { job, state } => {
                info!(job = %job, state = %state, "job completed");
            }
        }
    }
}

/// Test sink recording every event in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}
