//! Priority/FIFO task queue with atomic leasing
//!
//! Holding area for runnable task ids. Ordering is FIFO within a priority
//! tier; higher tiers are leased first. Leasing is atomic with respect to
//! concurrent callers: no two workers ever receive a lease for the same task.
//! The queue is a derived view of the task store and is rebuilt from it on
//! startup; it carries no persistence of its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use storyreel_core::{Priority, TaskId};

/// An active lease handed to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub task: TaskId,
    pub worker: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task {0} is not leased")]
    NotLeased(TaskId),

    #[error("lease on {task} is held by {holder}, not {caller}")]
    LeaseMismatch {
        task: TaskId,
        holder: String,
        caller: String,
    },
}

#[derive(Debug, Default)]
struct QueueInner {
    /// Ready entries per priority tier, FIFO within each tier
    ready: HashMap<Priority, VecDeque<TaskId>>,
    /// Membership index over `ready`
    queued: HashSet<TaskId>,
    /// Active leases by task
    leases: HashMap<TaskId, Lease>,
}

/// Shared task queue with a global in-flight cap
#[derive(Debug)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    max_in_flight: usize,
    lease_duration: Duration,
}

impl TaskQueue {
    pub fn new(max_in_flight: usize, lease_duration: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            max_in_flight,
            lease_duration,
        }
    }

    /// Enqueue a runnable task. Returns false if it is already queued or
    /// leased, so re-pushing is idempotent.
    pub fn push(&self, task: TaskId, priority: Priority) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.queued.contains(&task) || inner.leases.contains_key(&task) {
            return false;
        }
        inner.queued.insert(task.clone());
        inner.ready.entry(priority).or_default().push_back(task);
        true
    }

    /// Atomically lease the next ready task for `worker`.
    ///
    /// Returns `None` when the queue is empty or the in-flight cap is
    /// reached. The cap bounds the number of concurrently leased tasks
    /// process-wide, independent of how many callers poll.
    pub fn lease_next(&self, worker: &str) -> Option<Lease> {
        let mut inner = self.inner.lock().unwrap();
        if inner.leases.len() >= self.max_in_flight {
            return None;
        }

        let task = [Priority::High, Priority::Normal, Priority::Low]
            .iter()
            .find_map(|tier| inner.ready.get_mut(tier).and_then(VecDeque::pop_front))?;
        inner.queued.remove(&task);

        let now = Utc::now();
        let lease = Lease {
            task: task.clone(),
            worker: worker.to_string(),
            granted_at: now,
            expires_at: now + chrono::Duration::from_std(self.lease_duration).unwrap_or_default(),
        };
        inner.leases.insert(task.clone(), lease.clone());
        debug!(task = %task, worker, "lease granted");
        Some(lease)
    }

    /// Extend an active lease by one lease duration from now
    pub fn renew_lease(&self, task: &TaskId, worker: &str) -> Result<Lease, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let lease = inner
            .leases
            .get_mut(task)
            .ok_or_else(|| QueueError::NotLeased(task.clone()))?;
        if lease.worker != worker {
            return Err(QueueError::LeaseMismatch {
                task: task.clone(),
                holder: lease.worker.clone(),
                caller: worker.to_string(),
            });
        }
        lease.expires_at =
            Utc::now() + chrono::Duration::from_std(self.lease_duration).unwrap_or_default();
        Ok(lease.clone())
    }

    /// Complete a lease after successful execution
    pub fn ack(&self, task: &TaskId, worker: &str) -> Result<(), QueueError> {
        self.release(task, worker)
    }

    /// Release a lease after failed execution. The task is not requeued
    /// here; the scheduler decides between retry and terminal failure.
    pub fn nack(&self, task: &TaskId, worker: &str) -> Result<(), QueueError> {
        self.release(task, worker)
    }

    fn release(&self, task: &TaskId, worker: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.leases.get(task) {
            None => return Err(QueueError::NotLeased(task.clone())),
            Some(lease) if lease.worker != worker => {
                return Err(QueueError::LeaseMismatch {
                    task: task.clone(),
                    holder: lease.worker.clone(),
                    caller: worker.to_string(),
                });
            }
            Some(_) => {}
        }
        inner.leases.remove(task);
        Ok(())
    }

    /// Drop a lease regardless of holder (reclaim or cancellation)
    pub fn revoke(&self, task: &TaskId) -> Option<Lease> {
        self.inner.lock().unwrap().leases.remove(task)
    }

    /// Remove a task from the ready queue (cascade failure or cancellation)
    pub fn remove(&self, task: &TaskId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.queued.remove(task) {
            return false;
        }
        for tier in inner.ready.values_mut() {
            tier.retain(|t| t != task);
        }
        true
    }

    /// Re-register a lease recovered from the store after restart
    pub fn restore_lease(&self, lease: Lease) {
        let mut inner = self.inner.lock().unwrap();
        inner.queued.remove(&lease.task);
        inner.leases.insert(lease.task.clone(), lease);
    }

    /// Leases whose expiry is at or before `now` (implicit nacks)
    pub fn expired_leases(&self, now: DateTime<Utc>) -> Vec<Lease> {
        let inner = self.inner.lock().unwrap();
        inner
            .leases
            .values()
            .filter(|l| l.expires_at <= now)
            .cloned()
            .collect()
    }

    /// Whether the task is currently queued or leased
    pub fn contains(&self, task: &TaskId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.queued.contains(task) || inner.leases.contains_key(task)
    }

    /// Number of active leases
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().leases.len()
    }

    /// Number of ready (unleased) entries
    pub fn ready_len(&self) -> usize {
        self.inner.lock().unwrap().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.queued.is_empty() && inner.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_core::JobId;

    fn task(job: JobId, name: &str) -> TaskId {
        TaskId::new(job, name)
    }

    fn queue(cap: usize) -> TaskQueue {
        TaskQueue::new(cap, Duration::from_secs(60))
    }

    #[test]
    fn test_fifo_within_tier() {
        let q = queue(10);
        let job = JobId::new();
        q.push(task(job, "a"), Priority::Normal);
        q.push(task(job, "b"), Priority::Normal);
        q.push(task(job, "c"), Priority::Normal);

        assert_eq!(q.lease_next("w").unwrap().task.name, "a");
        assert_eq!(q.lease_next("w").unwrap().task.name, "b");
        assert_eq!(q.lease_next("w").unwrap().task.name, "c");
    }

    #[test]
    fn test_priority_jumps_the_queue() {
        let q = queue(10);
        let job = JobId::new();
        q.push(task(job, "normal"), Priority::Normal);
        q.push(task(job, "low"), Priority::Low);
        q.push(task(job, "high"), Priority::High);

        assert_eq!(q.lease_next("w").unwrap().task.name, "high");
        assert_eq!(q.lease_next("w").unwrap().task.name, "normal");
        assert_eq!(q.lease_next("w").unwrap().task.name, "low");
    }

    #[test]
    fn test_no_double_lease() {
        let q = queue(10);
        let job = JobId::new();
        q.push(task(job, "a"), Priority::Normal);

        let lease = q.lease_next("w1").unwrap();
        assert_eq!(lease.task.name, "a");
        // Nothing left to lease, and the leased task cannot be re-pushed
        assert!(q.lease_next("w2").is_none());
        assert!(!q.push(task(job, "a"), Priority::Normal));
    }

    #[test]
    fn test_in_flight_cap() {
        let q = queue(2);
        let job = JobId::new();
        for i in 0..10 {
            q.push(task(job, &format!("t{i}")), Priority::Normal);
        }

        assert!(q.lease_next("w1").is_some());
        assert!(q.lease_next("w2").is_some());
        // Cap reached: further leases refused until one completes
        assert!(q.lease_next("w3").is_none());
        assert_eq!(q.in_flight(), 2);

        let first = task(job, "t0");
        q.ack(&first, "w1").unwrap();
        assert!(q.lease_next("w3").is_some());
    }

    #[test]
    fn test_ack_requires_holder() {
        let q = queue(10);
        let job = JobId::new();
        let id = task(job, "a");
        q.push(id.clone(), Priority::Normal);
        q.lease_next("w1").unwrap();

        assert!(matches!(
            q.ack(&id, "w2"),
            Err(QueueError::LeaseMismatch { .. })
        ));
        q.ack(&id, "w1").unwrap();
        assert!(matches!(q.ack(&id, "w1"), Err(QueueError::NotLeased(_))));
    }

    #[test]
    fn test_nack_releases_without_requeue() {
        let q = queue(10);
        let job = JobId::new();
        let id = task(job, "a");
        q.push(id.clone(), Priority::Normal);
        q.lease_next("w1").unwrap();

        q.nack(&id, "w1").unwrap();
        assert_eq!(q.in_flight(), 0);
        assert_eq!(q.ready_len(), 0);
        // Requeue is the scheduler's decision
        assert!(q.push(id, Priority::Normal));
    }

    #[test]
    fn test_expired_lease_detection() {
        let q = queue(10);
        let job = JobId::new();
        let id = task(job, "a");
        q.push(id.clone(), Priority::Normal);
        let lease = q.lease_next("w1").unwrap();

        assert!(q.expired_leases(Utc::now()).is_empty());
        let later = lease.expires_at + chrono::Duration::seconds(1);
        let expired = q.expired_leases(later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].task, id);
    }

    #[test]
    fn test_renew_extends_expiry() {
        let q = queue(10);
        let job = JobId::new();
        let id = task(job, "a");
        q.push(id.clone(), Priority::Normal);
        let lease = q.lease_next("w1").unwrap();

        let renewed = q.renew_lease(&id, "w1").unwrap();
        assert!(renewed.expires_at >= lease.expires_at);
        assert!(matches!(
            q.renew_lease(&id, "w2"),
            Err(QueueError::LeaseMismatch { .. })
        ));
    }

    #[test]
    fn test_remove_from_ready() {
        let q = queue(10);
        let job = JobId::new();
        let id = task(job, "a");
        q.push(id.clone(), Priority::Normal);

        assert!(q.remove(&id));
        assert!(q.lease_next("w").is_none());
        assert!(!q.remove(&id));
    }

    #[test]
    fn test_restore_lease_counts_toward_cap() {
        let q = queue(1);
        let job = JobId::new();
        let id = task(job, "a");
        let now = Utc::now();
        q.restore_lease(Lease {
            task: id,
            worker: "w1".to_string(),
            granted_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        });

        q.push(task(job, "b"), Priority::Normal);
        assert!(q.lease_next("w2").is_none());
        assert_eq!(q.in_flight(), 1);
    }
}
