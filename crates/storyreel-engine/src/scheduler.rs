//! Scheduler core
//!
//! Owns the control flow between the store, the queue, and the per-job
//! dependency graphs: job submission, the periodic tick (lease reclaim and
//! backoff release), completion handling with AND-join propagation, cascade
//! failure, retry, and cancellation. Workers only ever call `claim`,
//! `handle_success`, and `handle_failure`; every state decision lives here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use storyreel_core::config::{BranchFailurePolicy, Config};
use storyreel_core::{JobId, JobSpec, JobState, TaskError, TaskId, TaskKind, TaskState};
use storyreel_stages::{StageRegistry, StageRequest};

use crate::events::{EventSink, PipelineEvent};
use crate::graph::{GraphError, PipelineGraph};
use crate::queue::{Lease, QueueError, TaskQueue};
use crate::store::{JobRecord, StoreError, TaskOutcome, TaskRecord, TaskStore};

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Snapshot of one job for status reporting
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job: JobRecord,
    pub tasks: Vec<TaskRecord>,
    /// Fraction of tasks in a terminal state
    pub progress: f64,
}

/// The scheduling core shared by workers and the CLI
pub struct Scheduler {
    config: Config,
    store: Arc<TaskStore>,
    queue: Arc<TaskQueue>,
    registry: StageRegistry,
    events: Arc<dyn EventSink>,
    /// Dependency graphs per live job, rebuilt from the store on startup
    graphs: Mutex<HashMap<JobId, PipelineGraph>>,
}

impl Scheduler {
    /// Build a scheduler over an (possibly freshly reopened) store.
    ///
    /// Recovery happens here: graphs are rebuilt for every non-terminal job,
    /// live leases re-registered in the queue, and runnable tasks enqueued.
    pub fn new(
        config: Config,
        store: Arc<TaskStore>,
        registry: StageRegistry,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError> {
        let queue = Arc::new(TaskQueue::new(
            config.scheduler.max_concurrent_tasks,
            config.scheduler.lease_duration(),
        ));
        let scheduler = Self {
            config,
            store,
            queue,
            registry,
            events,
            graphs: Mutex::new(HashMap::new()),
        };
        scheduler.recover()?;
        Ok(scheduler)
    }

    fn recover(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let mut restored = 0usize;
        for job in self.store.list_jobs() {
            if job.state.is_terminal() {
                continue;
            }
            let records = self.store.list_tasks(job.id)?;
            match PipelineGraph::from_records(&records) {
                Ok(graph) => {
                    self.graphs.lock().unwrap().insert(job.id, graph);
                }
                Err(e) => {
                    warn!(job = %job.id, error = %e, "skipping job with invalid task graph");
                    continue;
                }
            }
            for record in &records {
                match record.state {
                    TaskState::Leased => {
                        if let Some(lease) = &record.lease {
                            self.queue.restore_lease(Lease {
                                task: record.id.clone(),
                                worker: lease.worker.clone(),
                                granted_at: lease.granted_at,
                                expires_at: lease.expires_at,
                            });
                            restored += 1;
                        }
                    }
                    TaskState::Runnable if record.leasable_at(now) => {
                        self.queue.push(record.id.clone(), record.priority);
                    }
                    _ => {}
                }
            }
        }
        if restored > 0 {
            info!(leases = restored, "restored live leases after restart");
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage_registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Submit a job: expand the pipeline, validate the graph, persist every
    /// task, and enqueue the roots. Validation happens before anything is
    /// written, so a bad spec leaves no partial job behind.
    pub fn submit(&self, spec: JobSpec) -> Result<JobRecord, SchedulerError> {
        let probe = JobId::new();
        let seeds = PipelineGraph::expand(probe, &spec);
        PipelineGraph::from_seeds(&seeds)?;

        let job = self.store.create_job(spec)?;
        let seeds = PipelineGraph::expand(job.id, &job.spec);
        let graph = PipelineGraph::from_seeds(&seeds)?;
        let task_count = seeds.len();

        for seed in seeds {
            let record = self.store.create_task(
                job.id,
                seed.kind,
                seed.scene,
                seed.predecessors,
                job.spec.priority,
                self.config.stages.timeout_for(seed.kind),
                self.config.scheduler.max_attempts,
            )?;
            if record.state == TaskState::Runnable {
                self.queue.push(record.id, record.priority);
            }
        }

        self.graphs.lock().unwrap().insert(job.id, graph);
        self.events.emit(PipelineEvent::JobSubmitted {
            job: job.id,
            tasks: task_count,
        });
        info!(job = %job.id, tasks = task_count, "job submitted");
        Ok(job)
    }

    pub fn status(&self, job: JobId) -> Result<JobStatus, SchedulerError> {
        Ok(JobStatus {
            job: self.store.get_job(job)?,
            tasks: self.store.list_tasks(job)?,
            progress: self.store.job_progress(job)?,
        })
    }

    pub fn list_jobs(&self) -> Vec<JobRecord> {
        self.store.list_jobs()
    }

    /// Cancel a job: revoke leases, cancel every non-terminal task, and mark
    /// the job cancelled. In-flight results arriving afterwards hit a state
    /// conflict and are discarded.
    pub fn cancel(&self, job: JobId) -> Result<JobRecord, SchedulerError> {
        for record in self.store.list_tasks(job)? {
            if record.state.is_terminal() {
                continue;
            }
            self.queue.remove(&record.id);
            self.queue.revoke(&record.id);
            match self.store.update_task_state(
                &record.id,
                record.state,
                TaskState::Cancelled,
                TaskOutcome::None,
            ) {
                Ok(_) => {
                    self.events
                        .emit(PipelineEvent::TaskCancelled { task: record.id });
                }
                // The task moved under us; re-read and cancel if still live
                Err(StoreError::StateConflict { .. }) => {
                    let current = self.store.get_task(&record.id)?;
                    if !current.state.is_terminal() {
                        self.store.update_task_state(
                            &record.id,
                            current.state,
                            TaskState::Cancelled,
                            TaskOutcome::None,
                        )?;
                        self.events
                            .emit(PipelineEvent::TaskCancelled { task: record.id });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        let updated = self.store.set_job_state(job, JobState::Cancelled)?;
        self.events.emit(PipelineEvent::JobCompleted {
            job,
            state: JobState::Cancelled,
        });
        Ok(updated)
    }

    /// Retry a failed or cancelled job: reset every non-succeeded terminal
    /// task to a fresh round of attempts and put the job back in `Running`.
    pub fn retry(&self, job: JobId) -> Result<JobRecord, SchedulerError> {
        let mut reset_any = false;
        for record in self.store.list_tasks(job)? {
            if matches!(record.state, TaskState::Failed | TaskState::Cancelled) {
                self.store.reset_task(&record.id, TaskState::Pending)?;
                reset_any = true;
            }
        }
        if reset_any {
            self.requeue_eligible(job)?;
        }
        self.store.clear_job_error(job)?;
        let updated = self.store.set_job_state(job, JobState::Running)?;
        Ok(updated)
    }

    /// Retry a single failed task plus the dependents its failure doomed
    pub fn retry_task(&self, task: &TaskId) -> Result<(), SchedulerError> {
        let record = self.store.get_task(task)?;
        self.store.reset_task(task, TaskState::Pending)?;

        let graph = self.graph_for(task.job)?;
        for doomed in graph.cascade_targets(task) {
            let current = self.store.get_task(&doomed)?;
            let cascaded = current
                .last_error
                .as_ref()
                .map_or(false, |e| e.kind == storyreel_core::FailureKind::DependencyFailed);
            if current.state == TaskState::Failed && cascaded {
                self.store.reset_task(&doomed, TaskState::Pending)?;
            }
        }

        self.requeue_eligible(record.id.job)?;
        self.store.clear_job_error(task.job)?;
        self.store.set_job_state(task.job, JobState::Running)?;
        Ok(())
    }

    /// Promote pending tasks whose predecessors have all succeeded
    fn requeue_eligible(&self, job: JobId) -> Result<(), SchedulerError> {
        let graph = self.graph_for(job)?;
        let records: HashMap<TaskId, TaskRecord> = self
            .store
            .list_tasks(job)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        for id in graph.topological_order() {
            let Some(record) = records.get(id) else {
                continue;
            };
            if record.state != TaskState::Pending {
                continue;
            }
            let ready = graph.predecessors(id).iter().all(|p| {
                records
                    .get(p)
                    .map_or(false, |r| r.state == TaskState::Succeeded)
            });
            if ready {
                let updated = self.store.update_task_state(
                    id,
                    TaskState::Pending,
                    TaskState::Runnable,
                    TaskOutcome::None,
                )?;
                self.queue.push(updated.id, updated.priority);
            }
        }
        Ok(())
    }

    /// One scheduler pass at `now`: reclaim expired leases as timeout
    /// failures, then release runnable tasks whose backoff has elapsed.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        for record in self.store.expired_leased_tasks(now) {
            let worker = record
                .lease
                .as_ref()
                .map(|l| l.worker.clone())
                .unwrap_or_default();
            let expired_at = record
                .lease
                .as_ref()
                .map(|l| l.expires_at)
                .unwrap_or(now);
            self.queue.revoke(&record.id);
            self.events.emit(PipelineEvent::LeaseReclaimed {
                task: record.id.clone(),
                worker,
                expired_at,
            });
            self.handle_failure(&record.id, TaskError::timeout("lease expired"))?;
        }

        for record in self.store.tasks_in_state(TaskState::Runnable) {
            if record.leasable_at(now) {
                self.queue.push(record.id, record.priority);
            }
        }
        Ok(())
    }

    /// Atomically claim the next task for `worker`.
    ///
    /// A queue entry whose store record is no longer runnable (cancelled
    /// under us) is dropped and the next entry tried.
    pub fn claim(&self, worker: &str) -> Option<(TaskRecord, Lease)> {
        loop {
            let lease = self.queue.lease_next(worker)?;
            match self.store.mark_leased(&lease.task, worker, lease.expires_at) {
                Ok(record) => {
                    self.events.emit(PipelineEvent::TaskLeased {
                        task: record.id.clone(),
                        worker: worker.to_string(),
                        attempt: record.attempts,
                    });
                    return Some((record, lease));
                }
                Err(StoreError::StateConflict { .. }) => {
                    // Stale queue entry; drop it and keep going
                    let _ = self.queue.ack(&lease.task, worker);
                }
                Err(e) => {
                    warn!(task = %lease.task, error = %e, "dropping unleasable queue entry");
                    let _ = self.queue.ack(&lease.task, worker);
                    return None;
                }
            }
        }
    }

    /// Renew the lease on a task a worker is still executing
    pub fn renew_lease(&self, task: &TaskId, worker: &str) -> Result<(), SchedulerError> {
        let lease = self.queue.renew_lease(task, worker)?;
        self.store.renew_lease(task, worker, lease.expires_at)?;
        Ok(())
    }

    /// Record a successful execution and propagate readiness downstream
    pub fn handle_success(
        &self,
        task: &TaskId,
        worker: &str,
        artifact: PathBuf,
    ) -> Result<(), SchedulerError> {
        match self.store.update_task_state(
            task,
            TaskState::Leased,
            TaskState::Succeeded,
            TaskOutcome::Output(artifact),
        ) {
            Ok(_) => {}
            // Cancelled (or reclaimed) while executing; discard the result
            Err(StoreError::StateConflict { actual, .. }) => {
                debug!(task = %task, state = %actual, "discarding stale result");
                let _ = self.queue.ack(task, worker);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        let _ = self.queue.ack(task, worker);
        self.events
            .emit(PipelineEvent::TaskSucceeded { task: task.clone() });

        let graph = self.graph_for(task.job)?;
        let store = &self.store;
        let newly = graph.newly_runnable(task, |id| {
            store
                .get_task(id)
                .map(|r| r.state)
                .unwrap_or(TaskState::Pending)
        });
        for id in newly {
            let updated = self.store.update_task_state(
                &id,
                TaskState::Pending,
                TaskState::Runnable,
                TaskOutcome::None,
            )?;
            self.queue.push(updated.id, updated.priority);
        }

        self.aggregate_job(task.job)
    }

    /// Record a failed execution: schedule a backoff retry while attempts
    /// remain and the failure is retryable, otherwise fail terminally and
    /// cascade to every transitive dependent.
    pub fn handle_failure(&self, task: &TaskId, error: TaskError) -> Result<(), SchedulerError> {
        let record = match self.store.get_task(task) {
            Ok(r) => r,
            Err(StoreError::UnknownTask(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if record.state != TaskState::Leased {
            // Cancelled or already reclaimed; nothing to record
            debug!(task = %task, state = %record.state, "discarding stale failure");
            self.queue.revoke(task);
            return Ok(());
        }

        self.queue.revoke(task);
        let will_retry = error.kind.is_retryable() && !record.attempts_exhausted();

        if will_retry {
            let delay = self
                .config
                .scheduler
                .backoff_delay(record.attempts.saturating_sub(1));
            self.store.update_task_state(
                task,
                TaskState::Leased,
                TaskState::Runnable,
                TaskOutcome::Failure(error.clone()),
            )?;
            let until = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            self.store.defer_until(task, until)?;
            self.events.emit(PipelineEvent::TaskFailed {
                task: task.clone(),
                error,
                will_retry: true,
            });
            return Ok(());
        }

        self.store.update_task_state(
            task,
            TaskState::Leased,
            TaskState::Failed,
            TaskOutcome::Failure(error.clone()),
        )?;
        self.events.emit(PipelineEvent::TaskFailed {
            task: task.clone(),
            error: error.clone(),
            will_retry: false,
        });
        self.store.set_job_error(task.job, task.clone(), error)?;
        self.cascade_failure(task)?;

        if self.config.scheduler.on_branch_failure == BranchFailurePolicy::FailFast {
            self.cancel_remaining(task.job)?;
        }
        self.aggregate_job(task.job)
    }

    /// Mark every transitive dependent of a terminally failed task as failed
    fn cascade_failure(&self, failed: &TaskId) -> Result<(), SchedulerError> {
        let graph = self.graph_for(failed.job)?;
        let reason = TaskError::dependency_failed(format!("upstream task {failed} failed"));
        for doomed in graph.cascade_targets(failed) {
            let current = self.store.get_task(&doomed)?;
            if current.state.is_terminal() {
                continue;
            }
            self.queue.remove(&doomed);
            self.queue.revoke(&doomed);
            match self.store.update_task_state(
                &doomed,
                current.state,
                TaskState::Failed,
                TaskOutcome::Failure(reason.clone()),
            ) {
                Ok(_) => {
                    self.events.emit(PipelineEvent::TaskFailed {
                        task: doomed,
                        error: reason.clone(),
                        will_retry: false,
                    });
                }
                Err(StoreError::StateConflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Cancel every still-live task of a job (fail-fast policy)
    fn cancel_remaining(&self, job: JobId) -> Result<(), SchedulerError> {
        for record in self.store.list_tasks(job)? {
            if record.state.is_terminal() {
                continue;
            }
            self.queue.remove(&record.id);
            self.queue.revoke(&record.id);
            match self.store.update_task_state(
                &record.id,
                record.state,
                TaskState::Cancelled,
                TaskOutcome::None,
            ) {
                Ok(_) => {
                    self.events
                        .emit(PipelineEvent::TaskCancelled { task: record.id });
                }
                Err(StoreError::StateConflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Derive the job state once every task is terminal
    fn aggregate_job(&self, job: JobId) -> Result<(), SchedulerError> {
        let record = self.store.get_job(job)?;
        if record.state != JobState::Running {
            return Ok(());
        }
        let tasks = self.store.list_tasks(job)?;
        if tasks.iter().any(|t| !t.state.is_terminal()) {
            return Ok(());
        }

        let any_failed = tasks.iter().any(|t| t.state == TaskState::Failed);
        let any_cancelled = tasks.iter().any(|t| t.state == TaskState::Cancelled);
        let state = if !any_failed && !any_cancelled {
            JobState::Succeeded
        } else if any_failed {
            let scene_done = tasks.iter().any(|t| {
                t.kind == TaskKind::AssembleScene && t.state == TaskState::Succeeded
            });
            if self.config.scheduler.on_branch_failure == BranchFailurePolicy::ContinueBranches
                && scene_done
            {
                JobState::PartiallyFailed
            } else {
                JobState::Failed
            }
        } else {
            JobState::Cancelled
        };

        self.store.set_job_state(job, state)?;
        self.events.emit(PipelineEvent::JobCompleted { job, state });
        info!(job = %job, state = %state, "job reached terminal state");
        Ok(())
    }

    /// Build the execution request a worker hands to the stage executor
    pub fn stage_request(&self, record: &TaskRecord) -> Result<StageRequest, SchedulerError> {
        let job = self.store.get_job(record.id.job)?;
        let mut upstream = Vec::new();
        for pred in &record.predecessors {
            if let Some(result) = self.store.get_task(pred)?.result {
                upstream.push(result);
            }
        }
        Ok(StageRequest {
            task: record.id.clone(),
            kind: record.kind,
            scene: record.scene,
            input: job.spec.input.clone(),
            upstream,
            workdir: self.config.paths.work_dir.join(record.id.job.to_string()),
            output: job.spec.output.clone(),
            deadline: record.timeout(),
        })
    }

    /// Whether any job still has non-terminal work
    pub fn has_live_jobs(&self) -> bool {
        self.store.list_jobs().iter().any(|j| !j.state.is_terminal())
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    fn graph_for(&self, job: JobId) -> Result<PipelineGraph, SchedulerError> {
        if let Some(graph) = self.graphs.lock().unwrap().get(&job) {
            return Ok(graph.clone());
        }
        let records = self.store.list_tasks(job)?;
        let graph = PipelineGraph::from_records(&records)?;
        self.graphs.lock().unwrap().insert(job, graph.clone());
        Ok(graph)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue)
            .finish()
    }
}
