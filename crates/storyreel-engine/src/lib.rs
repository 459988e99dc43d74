//! Storyreel Engine - task scheduling and pipeline execution
//!
//! The engine turns a submitted job into a dependency graph of stage tasks
//! and drives them to completion: a durable [`store::TaskStore`] holds all
//! state, a [`queue::TaskQueue`] hands out atomic leases, the
//! [`scheduler::Scheduler`] enforces ordering, retry, and failure policy, and
//! a [`worker::WorkerPool`] executes stages through the registry.

pub mod events;
pub mod graph;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use events::{CollectingSink, EventSink, PipelineEvent, TracingSink};
pub use graph::{GraphError, PipelineGraph, TaskSeed};
pub use queue::{Lease, QueueError, TaskQueue};
pub use scheduler::{JobStatus, Scheduler, SchedulerError};
pub use store::{
    JobError, JobRecord, LeaseRecord, StoreError, TaskOutcome, TaskRecord, TaskStore,
};
pub use worker::{run_until_idle, WorkerPool};
