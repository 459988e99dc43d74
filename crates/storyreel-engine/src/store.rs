//! Durable task and job store
//!
//! Single source of truth for every job and task: state, attempt count,
//! timestamps, result reference, dependency set. All mutation goes through a
//! conditional state transition, giving per-task optimistic locking without a
//! global lock across tasks. When opened with a data directory, every
//! committed transition is persisted as one JSON record per job and replayed
//! on restart, so a crash never leaves a task between states.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use storyreel_core::{
    JobId, JobSpec, JobState, Priority, TaskError, TaskId, TaskKind, TaskState,
};

/// A worker's time-bounded claim on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Worker holding the lease
    pub worker: String,
    /// When the lease was granted
    pub granted_at: DateTime<Utc>,
    /// When the lease lapses if not renewed or completed
    pub expires_at: DateTime<Utc>,
}

/// Persisted record of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Scene number for per-scene stages
    pub scene: Option<u32>,
    /// Predecessor set, fixed at creation
    pub predecessors: Vec<TaskId>,
    pub state: TaskState,
    pub priority: Priority,
    /// Execution attempts so far (incremented when leased)
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub created_at: DateTime<Utc>,
    /// Earliest time the task may be leased again (retry backoff)
    pub scheduled_at: Option<DateTime<Utc>>,
    pub leased_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Active lease, if any
    pub lease: Option<LeaseRecord>,
    /// Result artifact reference
    pub result: Option<PathBuf>,
    pub last_error: Option<TaskError>,
}

impl TaskRecord {
    /// Declared execution timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether all execution attempts have been consumed
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Whether the task may be leased at `now` (runnable and past any backoff)
    pub fn leasable_at(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::Runnable && self.scheduled_at.map_or(true, |at| at <= now)
    }
}

/// The failure a job surfaces to the user: the deepest failing task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub task: TaskId,
    pub error: TaskError,
}

/// Persisted record of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub spec: JobSpec,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<JobError>,
}

/// Outcome attached to a task state transition
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// No payload
    None,
    /// Successful result artifact
    Output(PathBuf),
    /// Recorded failure
    Failure(TaskError),
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Conditional update found the task in a different state
    #[error("state conflict on {task}: expected {expected}, found {actual}")]
    StateConflict {
        task: TaskId,
        expected: TaskState,
        actual: TaskState,
    },

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("task {0} already exists")]
    DuplicateTask(TaskId),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk shape: one file per job holding the job and its tasks
#[derive(Debug, Serialize, Deserialize)]
struct JobFile {
    job: JobRecord,
    tasks: Vec<TaskRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    tasks: HashMap<TaskId, TaskRecord>,
    /// Task creation order per job
    by_job: HashMap<JobId, Vec<TaskId>>,
}

/// Durable task/job store with conditional state transitions
#[derive(Debug)]
pub struct TaskStore {
    inner: Mutex<Inner>,
    data_dir: Option<PathBuf>,
}

impl TaskStore {
    /// Create a volatile store (no persistence); used by tests
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            data_dir: None,
        }
    }

    /// Open a durable store rooted at `data_dir`, replaying persisted jobs.
    ///
    /// Leased tasks whose lease already expired are reset to runnable; their
    /// attempt was counted when the lease was granted.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;

        let mut inner = Inner::default();
        let now = Utc::now();
        let mut recovered = 0usize;

        for entry in std::fs::read_dir(data_dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            let file: JobFile = match serde_json::from_str(&contents) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable job record");
                    continue;
                }
            };

            let job_id = file.job.id;
            inner.jobs.insert(job_id, file.job);
            let order = inner.by_job.entry(job_id).or_default();
            for mut task in file.tasks {
                if task.state == TaskState::Leased
                    && task.lease.as_ref().map_or(true, |l| l.expires_at <= now)
                {
                    task.state = TaskState::Runnable;
                    task.lease = None;
                    task.leased_at = None;
                    recovered += 1;
                }
                order.push(task.id.clone());
                inner.tasks.insert(task.id.clone(), task);
            }
        }

        info!(
            jobs = inner.jobs.len(),
            tasks = inner.tasks.len(),
            recovered_leases = recovered,
            "task store opened"
        );

        let store = Self {
            inner: Mutex::new(inner),
            data_dir: Some(data_dir.to_path_buf()),
        };
        if recovered > 0 {
            let guard = store.inner.lock().unwrap();
            let jobs: Vec<JobId> = guard.jobs.keys().copied().collect();
            for job in jobs {
                store.persist_job_locked(&guard, job)?;
            }
        }
        Ok(store)
    }

    /// Create a new job record in `Running` state
    pub fn create_job(&self, spec: JobSpec) -> Result<JobRecord, StoreError> {
        let record = JobRecord {
            id: JobId::new(),
            spec,
            state: JobState::Running,
            created_at: Utc::now(),
            completed_at: None,
            last_error: None,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(record.id, record.clone());
        inner.by_job.entry(record.id).or_default();
        self.persist_job_locked(&inner, record.id)?;
        debug!(job = %record.id, "job created");
        Ok(record)
    }

    /// Create a task for a job. The predecessor set is fixed at creation.
    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        &self,
        job: JobId,
        kind: TaskKind,
        scene: Option<u32>,
        predecessors: Vec<TaskId>,
        priority: Priority,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<TaskRecord, StoreError> {
        let id = TaskId::new(job, kind.instance_name(scene));
        let state = if predecessors.is_empty() {
            TaskState::Runnable
        } else {
            TaskState::Pending
        };
        let record = TaskRecord {
            id: id.clone(),
            kind,
            scene,
            predecessors,
            state,
            priority,
            attempts: 0,
            max_attempts,
            timeout_secs: timeout.as_secs(),
            created_at: Utc::now(),
            scheduled_at: None,
            leased_at: None,
            completed_at: None,
            lease: None,
            result: None,
            last_error: None,
        };

        let mut inner = self.inner.lock().unwrap();
        if !inner.jobs.contains_key(&job) {
            return Err(StoreError::UnknownJob(job));
        }
        if inner.tasks.contains_key(&id) {
            return Err(StoreError::DuplicateTask(id));
        }
        inner.tasks.insert(id.clone(), record.clone());
        inner.by_job.entry(job).or_default().push(id);
        self.persist_job_locked(&inner, job)?;
        Ok(record)
    }

    pub fn get_job(&self, job: JobId) -> Result<JobRecord, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(&job)
            .cloned()
            .ok_or(StoreError::UnknownJob(job))
    }

    pub fn get_task(&self, task: &TaskId) -> Result<TaskRecord, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .get(task)
            .cloned()
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))
    }

    /// All tasks of a job, in creation order
    pub fn list_tasks(&self, job: JobId) -> Result<Vec<TaskRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let order = inner
            .by_job
            .get(&job)
            .ok_or(StoreError::UnknownJob(job))?;
        Ok(order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect())
    }

    /// All jobs, sorted chronologically by creation time
    pub fn list_jobs(&self) -> Vec<JobRecord> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<JobRecord> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Index by state, used for queue recovery and the scheduler tick
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<TaskRecord> {
        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<TaskRecord> = inner
            .tasks
            .values()
            .filter(|t| t.state == state)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Conditional state transition.
    ///
    /// Fails with `StateConflict` if the task is not currently in `from`,
    /// guaranteeing exactly-once transitions under concurrent access.
    pub fn update_task_state(
        &self,
        task: &TaskId,
        from: TaskState,
        to: TaskState,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .tasks
            .get_mut(task)
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))?;

        if record.state != from {
            return Err(StoreError::StateConflict {
                task: task.clone(),
                expected: from,
                actual: record.state,
            });
        }

        record.state = to;
        match outcome {
            TaskOutcome::None => {}
            TaskOutcome::Output(path) => record.result = Some(path),
            TaskOutcome::Failure(error) => record.last_error = Some(error),
        }
        if to.is_terminal() {
            record.completed_at = Some(Utc::now());
        }
        if to != TaskState::Leased {
            record.lease = None;
            record.leased_at = None;
        }
        if to != TaskState::Runnable {
            record.scheduled_at = None;
        }

        let updated = record.clone();
        debug!(task = %task, from = %from, to = %to, "task transition committed");
        self.persist_job_locked(&inner, task.job)?;
        Ok(updated)
    }

    /// Conditional `Runnable -> Leased` transition; counts one attempt and
    /// records the lease.
    pub fn mark_leased(
        &self,
        task: &TaskId,
        worker: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .tasks
            .get_mut(task)
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))?;

        if record.state != TaskState::Runnable {
            return Err(StoreError::StateConflict {
                task: task.clone(),
                expected: TaskState::Runnable,
                actual: record.state,
            });
        }

        let now = Utc::now();
        record.state = TaskState::Leased;
        record.attempts += 1;
        record.leased_at = Some(now);
        record.scheduled_at = None;
        record.lease = Some(LeaseRecord {
            worker: worker.to_string(),
            granted_at: now,
            expires_at,
        });

        let updated = record.clone();
        self.persist_job_locked(&inner, task.job)?;
        Ok(updated)
    }

    /// Extend an active lease
    pub fn renew_lease(
        &self,
        task: &TaskId,
        worker: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .tasks
            .get_mut(task)
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))?;

        if let Some(lease) = record.lease.as_mut() {
            if lease.worker == worker {
                lease.expires_at = expires_at;
                self.persist_job_locked(&inner, task.job)?;
            }
        }
        Ok(())
    }

    /// Delay the next lease of a runnable task until `until` (retry backoff)
    pub fn defer_until(&self, task: &TaskId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .tasks
            .get_mut(task)
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))?;
        record.scheduled_at = Some(until);
        self.persist_job_locked(&inner, task.job)?;
        Ok(())
    }

    /// Leased tasks whose lease lapsed at or before `now`
    pub fn expired_leased_tasks(&self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .tasks
            .values()
            .filter(|t| {
                t.state == TaskState::Leased
                    && t.lease.as_ref().map_or(true, |l| l.expires_at <= now)
            })
            .cloned()
            .collect()
    }

    /// Set a job's derived state; terminal states record the completion time
    pub fn set_job_state(&self, job: JobId, state: JobState) -> Result<JobRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.jobs.get_mut(&job).ok_or(StoreError::UnknownJob(job))?;
        record.state = state;
        if state.is_terminal() {
            record.completed_at.get_or_insert_with(Utc::now);
        } else {
            record.completed_at = None;
        }
        let updated = record.clone();
        self.persist_job_locked(&inner, job)?;
        Ok(updated)
    }

    /// Record the deepest failing task on the job
    pub fn set_job_error(
        &self,
        job: JobId,
        task: TaskId,
        error: TaskError,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.jobs.get_mut(&job).ok_or(StoreError::UnknownJob(job))?;
        record.last_error = Some(JobError { task, error });
        self.persist_job_locked(&inner, job)?;
        Ok(())
    }

    /// Clear a job's recorded failure (used by retry)
    pub fn clear_job_error(&self, job: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.jobs.get_mut(&job).ok_or(StoreError::UnknownJob(job))?;
        record.last_error = None;
        self.persist_job_locked(&inner, job)?;
        Ok(())
    }

    /// Reset a failed task for a fresh round of attempts
    pub fn reset_task(&self, task: &TaskId, state: TaskState) -> Result<TaskRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .tasks
            .get_mut(task)
            .ok_or_else(|| StoreError::UnknownTask(task.clone()))?;
        record.state = state;
        record.attempts = 0;
        record.last_error = None;
        record.result = None;
        record.scheduled_at = None;
        record.leased_at = None;
        record.completed_at = None;
        record.lease = None;
        let updated = record.clone();
        self.persist_job_locked(&inner, task.job)?;
        Ok(updated)
    }

    /// Fraction of the job's tasks that reached a terminal state
    pub fn job_progress(&self, job: JobId) -> Result<f64, StoreError> {
        let tasks = self.list_tasks(job)?;
        if tasks.is_empty() {
            return Ok(0.0);
        }
        let done = tasks.iter().filter(|t| t.state.is_terminal()).count();
        Ok(done as f64 / tasks.len() as f64)
    }

    /// Remove jobs in terminal state (and their records on disk).
    /// Returns the number of jobs removed. Never called by the scheduler.
    pub fn cleanup_finished_jobs(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let finished: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| j.state.is_terminal())
            .map(|j| j.id)
            .collect();

        for job in &finished {
            inner.jobs.remove(job);
            if let Some(order) = inner.by_job.remove(job) {
                for id in order {
                    inner.tasks.remove(&id);
                }
            }
            if let Some(dir) = &self.data_dir {
                let path = dir.join(format!("{job}.json"));
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
            }
        }

        info!(removed = finished.len(), "cleaned up finished jobs");
        Ok(finished.len())
    }

    fn persist_job_locked(&self, inner: &Inner, job: JobId) -> Result<(), StoreError> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let Some(record) = inner.jobs.get(&job) else {
            return Ok(());
        };
        let tasks = inner
            .by_job
            .get(&job)
            .map(|order| {
                order
                    .iter()
                    .filter_map(|id| inner.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let file = JobFile {
            job: record.clone(),
            tasks,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let path = dir.join(format!("{job}.json"));
        let tmp = dir.join(format!("{job}.json.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec() -> JobSpec {
        JobSpec::new("novel.txt", "out/final.mp4", 2)
    }

    fn timeout() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn test_create_job_and_tasks() {
        let store = TaskStore::in_memory();
        let job = store.create_job(spec()).unwrap();
        assert_eq!(job.state, JobState::Running);

        let root = store
            .create_task(
                job.id,
                TaskKind::Analyze,
                None,
                vec![],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();
        assert_eq!(root.state, TaskState::Runnable);

        let dep = store
            .create_task(
                job.id,
                TaskKind::ScriptScene,
                Some(1),
                vec![root.id.clone()],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();
        assert_eq!(dep.state, TaskState::Pending);
        assert_eq!(store.list_tasks(job.id).unwrap().len(), 2);
    }

    #[test]
    fn test_conditional_update_conflict() {
        let store = TaskStore::in_memory();
        let job = store.create_job(spec()).unwrap();
        let task = store
            .create_task(
                job.id,
                TaskKind::Analyze,
                None,
                vec![],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();

        // Wrong `from` state is rejected without mutating the record
        let err = store
            .update_task_state(
                &task.id,
                TaskState::Leased,
                TaskState::Succeeded,
                TaskOutcome::None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::StateConflict { .. }));
        assert_eq!(store.get_task(&task.id).unwrap().state, TaskState::Runnable);
    }

    #[test]
    fn test_mark_leased_counts_attempt() {
        let store = TaskStore::in_memory();
        let job = store.create_job(spec()).unwrap();
        let task = store
            .create_task(
                job.id,
                TaskKind::Analyze,
                None,
                vec![],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();

        let expires = Utc::now() + chrono::Duration::seconds(60);
        let leased = store.mark_leased(&task.id, "worker-1", expires).unwrap();
        assert_eq!(leased.state, TaskState::Leased);
        assert_eq!(leased.attempts, 1);
        assert_eq!(leased.lease.as_ref().unwrap().worker, "worker-1");

        // A second lease attempt conflicts
        assert!(store.mark_leased(&task.id, "worker-2", expires).is_err());
    }

    #[test]
    fn test_terminal_transition_clears_lease() {
        let store = TaskStore::in_memory();
        let job = store.create_job(spec()).unwrap();
        let task = store
            .create_task(
                job.id,
                TaskKind::Analyze,
                None,
                vec![],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();
        let expires = Utc::now() + chrono::Duration::seconds(60);
        store.mark_leased(&task.id, "worker-1", expires).unwrap();

        let done = store
            .update_task_state(
                &task.id,
                TaskState::Leased,
                TaskState::Succeeded,
                TaskOutcome::Output(PathBuf::from("work/analyze.storyboard.json")),
            )
            .unwrap();
        assert!(done.lease.is_none());
        assert!(done.completed_at.is_some());
        assert_eq!(
            done.result.as_deref(),
            Some(Path::new("work/analyze.storyboard.json"))
        );
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp = TempDir::new().unwrap();
        let job_id;
        let task_id;
        {
            let store = TaskStore::open(temp.path()).unwrap();
            let job = store.create_job(spec()).unwrap();
            job_id = job.id;
            let task = store
                .create_task(
                    job.id,
                    TaskKind::Analyze,
                    None,
                    vec![],
                    Priority::High,
                    timeout(),
                    3,
                )
                .unwrap();
            task_id = task.id;
        }

        let store = TaskStore::open(temp.path()).unwrap();
        let job = store.get_job(job_id).unwrap();
        assert_eq!(job.state, JobState::Running);
        let task = store.get_task(&task_id).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.state, TaskState::Runnable);
    }

    #[test]
    fn test_restart_resets_expired_leases() {
        let temp = TempDir::new().unwrap();
        let task_id;
        {
            let store = TaskStore::open(temp.path()).unwrap();
            let job = store.create_job(spec()).unwrap();
            let task = store
                .create_task(
                    job.id,
                    TaskKind::Analyze,
                    None,
                    vec![],
                    Priority::Normal,
                    timeout(),
                    3,
                )
                .unwrap();
            task_id = task.id;
            // Lease that expired in the past, as left behind by a crash
            let expired = Utc::now() - chrono::Duration::seconds(10);
            store.mark_leased(&task_id, "worker-1", expired).unwrap();
        }

        let store = TaskStore::open(temp.path()).unwrap();
        let task = store.get_task(&task_id).unwrap();
        assert_eq!(task.state, TaskState::Runnable);
        assert!(task.lease.is_none());
        // The attempt consumed by the crashed worker stays counted
        assert_eq!(task.attempts, 1);
        // No result was recorded, so a re-execution cannot duplicate one
        assert!(task.result.is_none());
    }

    #[test]
    fn test_restart_keeps_live_leases() {
        let temp = TempDir::new().unwrap();
        let task_id;
        {
            let store = TaskStore::open(temp.path()).unwrap();
            let job = store.create_job(spec()).unwrap();
            let task = store
                .create_task(
                    job.id,
                    TaskKind::Analyze,
                    None,
                    vec![],
                    Priority::Normal,
                    timeout(),
                    3,
                )
                .unwrap();
            task_id = task.id;
            let expires = Utc::now() + chrono::Duration::seconds(3600);
            store.mark_leased(&task_id, "worker-1", expires).unwrap();
        }

        let store = TaskStore::open(temp.path()).unwrap();
        // Still within its lease window; the tick will reclaim it at expiry
        assert_eq!(store.get_task(&task_id).unwrap().state, TaskState::Leased);
    }

    #[test]
    fn test_job_progress() {
        let store = TaskStore::in_memory();
        let job = store.create_job(spec()).unwrap();
        let a = store
            .create_task(
                job.id,
                TaskKind::Analyze,
                None,
                vec![],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();
        store
            .create_task(
                job.id,
                TaskKind::ScriptScene,
                Some(1),
                vec![a.id.clone()],
                Priority::Normal,
                timeout(),
                3,
            )
            .unwrap();

        assert_eq!(store.job_progress(job.id).unwrap(), 0.0);
        let expires = Utc::now() + chrono::Duration::seconds(60);
        store.mark_leased(&a.id, "w", expires).unwrap();
        store
            .update_task_state(
                &a.id,
                TaskState::Leased,
                TaskState::Succeeded,
                TaskOutcome::None,
            )
            .unwrap();
        assert_eq!(store.job_progress(job.id).unwrap(), 0.5);
    }

    #[test]
    fn test_cleanup_finished_jobs() {
        let temp = TempDir::new().unwrap();
        let store = TaskStore::open(temp.path()).unwrap();
        let done = store.create_job(spec()).unwrap();
        store.set_job_state(done.id, JobState::Succeeded).unwrap();
        let live = store.create_job(spec()).unwrap();

        assert_eq!(store.cleanup_finished_jobs().unwrap(), 1);
        assert!(store.get_job(done.id).is_err());
        assert!(store.get_job(live.id).is_ok());
        assert!(!temp.path().join(format!("{}.json", done.id)).exists());
    }
}
