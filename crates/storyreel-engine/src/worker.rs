//! Worker pool
//!
//! A fixed set of tokio tasks that claim leases from the scheduler, run the
//! registered stage executor under the task's timeout, and report the outcome
//! back. Workers renew their lease at half the lease duration while the stage
//! is still running, so only a genuinely stuck worker loses its claim.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storyreel_core::TaskError;

use crate::scheduler::{Scheduler, SchedulerError};
use crate::store::TaskRecord;

/// Poll delay when the queue has nothing to hand out
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// A running pool of worker tasks
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `size` workers against the scheduler
    pub fn spawn(scheduler: Arc<Scheduler>, size: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handles = (0..size)
            .map(|i| {
                let scheduler = scheduler.clone();
                let rx = shutdown.subscribe();
                tokio::spawn(worker_loop(scheduler, format!("worker-{i}"), rx))
            })
            .collect();
        Self { handles, shutdown }
    }

    /// Signal shutdown and wait for in-flight executions to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(scheduler: Arc<Scheduler>, name: String, mut shutdown: watch::Receiver<bool>) {
    debug!(worker = %name, "worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match scheduler.claim(&name) {
            Some((record, _)) => {
                execute_one(&scheduler, &name, record).await;
            }
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_WAIT) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    debug!(worker = %name, "worker stopped");
}

/// Run one leased task to completion, timeout, or failure
async fn execute_one(scheduler: &Arc<Scheduler>, worker: &str, record: TaskRecord) {
    let task = record.id.clone();
    let outcome = run_stage(scheduler, worker, &record).await;
    let result = match outcome {
        Ok(artifact) => scheduler.handle_success(&task, worker, artifact),
        Err(error) => scheduler.handle_failure(&task, error),
    };
    if let Err(e) = result {
        warn!(task = %task, worker, error = %e, "failed to record task outcome");
    }
}

async fn run_stage(
    scheduler: &Arc<Scheduler>,
    worker: &str,
    record: &TaskRecord,
) -> Result<std::path::PathBuf, TaskError> {
    let Some(executor) = scheduler.stage_registry().get(record.kind) else {
        return Err(TaskError::permanent(format!(
            "no executor registered for stage {}",
            record.kind
        )));
    };
    let request = scheduler
        .stage_request(record)
        .map_err(|e| TaskError::permanent(format!("building stage request: {e}")))?;

    let lease_duration = scheduler.config().scheduler.lease_duration();
    let renew_every = (lease_duration / 2).max(Duration::from_millis(100));
    let mut renew = tokio::time::interval(renew_every);
    renew.tick().await; // first tick is immediate

    let exec = executor.execute(request);
    tokio::pin!(exec);
    let deadline = tokio::time::sleep(record.timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            result = &mut exec => {
                return match result {
                    Ok(output) => Ok(output.artifact),
                    Err(e) => Err(TaskError::new(e.failure_kind(), e.to_string())),
                };
            }
            _ = &mut deadline => {
                return Err(TaskError::timeout(format!(
                    "stage {} exceeded its {}s timeout",
                    record.kind,
                    record.timeout_secs
                )));
            }
            _ = renew.tick() => {
                if let Err(e) = scheduler.renew_lease(&record.id, worker) {
                    debug!(task = %record.id, worker, error = %e, "lease renewal failed");
                }
            }
        }
    }
}

/// Drive workers and the scheduler tick loop until every job is terminal.
///
/// Used by one-shot runs; a long-lived daemon would loop on `tick` forever
/// instead.
pub async fn run_until_idle(
    scheduler: Arc<Scheduler>,
    pool_size: usize,
) -> Result<(), SchedulerError> {
    let pool = WorkerPool::spawn(scheduler.clone(), pool_size);
    let period = scheduler
        .config()
        .scheduler
        .poll_interval()
        .max(Duration::from_millis(50));
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        scheduler.tick(Utc::now())?;
        if !scheduler.has_live_jobs() && scheduler.queue().is_empty() {
            break;
        }
    }
    pool.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;
    use crate::store::TaskStore;
    use storyreel_core::config::{Config, SchedulerConfig, StagesConfig};
    use storyreel_core::{JobSpec, JobState, TaskKind};
    use storyreel_stages::{StageError, StageRegistry, SimulatedStage};
    use tempfile::TempDir;

    fn test_config(temp: &TempDir, max_concurrent: usize) -> Config {
        let mut config = Config {
            scheduler: SchedulerConfig {
                max_concurrent_tasks: max_concurrent,
                max_attempts: 3,
                // Keep retries immediate: backoff is wall-clock while the
                // test runs on paused tokio time
                backoff_base_secs: 0,
                backoff_cap_secs: 0,
                lease_duration_secs: 3600,
                poll_interval_secs: 0,
                ..Default::default()
            },
            stages: StagesConfig {
                default_timeout_secs: 120,
                ..Default::default()
            },
            ..Default::default()
        };
        config.paths.work_dir = temp.path().join("work");
        config.paths.data_dir = temp.path().join("state");
        config
    }

    fn scheduler_with(config: Config) -> (Arc<Scheduler>, Arc<SimulatedStage>) {
        let (registry, stage) = StageRegistry::simulated();
        let scheduler = Scheduler::new(
            config,
            Arc::new(TaskStore::in_memory()),
            registry,
            Arc::new(CollectingSink::new()),
        )
        .unwrap();
        (Arc::new(scheduler), stage)
    }

    fn spec(temp: &TempDir, scenes: u32) -> JobSpec {
        JobSpec::new(
            temp.path().join("novel.txt"),
            temp.path().join("out/final.mp4"),
            scenes,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_runs_pipeline_to_completion() {
        let temp = TempDir::new().unwrap();
        let (scheduler, stage) = scheduler_with(test_config(&temp, 3));
        let job = scheduler.submit(spec(&temp, 2)).unwrap();

        run_until_idle(scheduler.clone(), 3).await.unwrap();

        let status = scheduler.status(job.id).unwrap();
        assert_eq!(status.job.state, JobState::Succeeded);
        assert!(temp.path().join("out/final.mp4").exists());

        // Final assembly ran after every scene assembly
        let invocations = stage.invocations();
        let pos = |name: &str| invocations.iter().position(|t| t.name == name).unwrap();
        assert!(pos("assemble-scene-1") < pos("assemble-final"));
        assert!(pos("assemble-scene-2") < pos("assemble-final"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_by_pool() {
        let temp = TempDir::new().unwrap();
        let (scheduler, stage) = scheduler_with(test_config(&temp, 2));
        stage.fail_next("analyze", StageError::Transient("rate limited".into()));
        let job = scheduler.submit(spec(&temp, 1)).unwrap();

        run_until_idle(scheduler.clone(), 2).await.unwrap();

        assert_eq!(
            scheduler.status(job.id).unwrap().job.state,
            JobState::Succeeded
        );
        assert_eq!(stage.invocation_count("analyze"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_fails_the_attempt() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, 2);
        config.scheduler.max_attempts = 1;
        let (scheduler, stage) = scheduler_with(config);
        // Stall well past the 120s stage timeout
        stage.delay_next("analyze", Duration::from_secs(600));
        let job = scheduler.submit(spec(&temp, 1)).unwrap();

        run_until_idle(scheduler.clone(), 2).await.unwrap();

        let status = scheduler.status(job.id).unwrap();
        assert_eq!(status.job.state, JobState::Failed);
        let analyze = status
            .tasks
            .iter()
            .find(|t| t.kind == TaskKind::Analyze)
            .unwrap();
        let error = analyze.last_error.as_ref().unwrap();
        assert_eq!(error.kind, storyreel_core::FailureKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_fails_fast() {
        let temp = TempDir::new().unwrap();
        let (scheduler, stage) = scheduler_with(test_config(&temp, 3));
        stage.fail_next(
            "script-scene-1",
            StageError::Permanent("unsupported content".into()),
        );
        let job = scheduler.submit(spec(&temp, 2)).unwrap();

        run_until_idle(scheduler.clone(), 3).await.unwrap();

        let status = scheduler.status(job.id).unwrap();
        assert_eq!(status.job.state, JobState::Failed);
        assert_eq!(
            status.job.last_error.as_ref().unwrap().task.name,
            "script-scene-1"
        );
        // Scripting ran exactly once; no retry of a permanent failure
        assert_eq!(stage.invocation_count("script-scene-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_shutdown_is_clean() {
        let temp = TempDir::new().unwrap();
        let (scheduler, _) = scheduler_with(test_config(&temp, 2));
        let pool = WorkerPool::spawn(scheduler, 2);
        pool.shutdown().await;
    }
}
