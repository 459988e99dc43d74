//! Configuration types

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::TaskKind;

/// Main configuration for Storyreel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    pub name: Option<String>,

    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Stage execution configuration
    pub stages: StagesConfig,

    /// Filesystem layout
    pub paths: PathsConfig,
}

/// What happens to the rest of a job when one scene branch permanently fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchFailurePolicy {
    /// Fail the whole job immediately and cancel remaining tasks
    #[default]
    FailFast,
    /// Let unaffected scene branches run to completion; the job ends
    /// partially-failed and keeps the per-scene outputs that succeeded
    ContinueBranches,
}

/// Scheduler loop and retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Global cap on concurrently leased tasks (also the worker pool size)
    pub max_concurrent_tasks: usize,

    /// Interval between scheduler ticks, in seconds
    pub poll_interval_secs: u64,

    /// Maximum execution attempts per task
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff, in seconds
    pub backoff_base_secs: u64,

    /// Upper bound on the retry backoff delay, in seconds
    pub backoff_cap_secs: u64,

    /// Duration of a worker's lease on a task, in seconds
    pub lease_duration_secs: u64,

    /// Policy for jobs whose independent scene branches partly fail
    pub on_branch_failure: BranchFailurePolicy,

    /// Default scene count for jobs that do not specify one
    pub default_scenes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            poll_interval_secs: 1,
            max_attempts: 3,
            backoff_base_secs: 30,
            backoff_cap_secs: 600,
            lease_duration_secs: 60,
            on_branch_failure: BranchFailurePolicy::FailFast,
            default_scenes: 4,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    /// Backoff delay before attempt `attempt + 1`: base × 2^attempt, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let delay = self
            .backoff_base_secs
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_secs);
        Duration::from_secs(delay)
    }
}

/// Per-stage execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    /// Timeout applied to stages with no specific override, in seconds
    pub default_timeout_secs: u64,

    /// Per-stage timeout overrides, keyed by stage name (e.g., "synth-clip")
    pub timeout_secs: HashMap<String, u64>,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 3600,
            timeout_secs: HashMap::new(),
        }
    }
}

impl StagesConfig {
    /// Effective timeout for a stage kind
    pub fn timeout_for(&self, kind: TaskKind) -> Duration {
        let secs = self
            .timeout_secs
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.default_timeout_secs);
        Duration::from_secs(secs)
    }
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding persisted job/task state
    pub data_dir: PathBuf,

    /// Directory for finished videos
    pub output_dir: PathBuf,

    /// Scratch directory for intermediate per-job artifacts
    pub work_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".storyreel/state"),
            output_dir: PathBuf::from("output"),
            work_dir: PathBuf::from(".storyreel/work"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_concurrent_tasks, 3);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(
            config.scheduler.on_branch_failure,
            BranchFailurePolicy::FailFast
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = SchedulerConfig {
            backoff_base_secs: 30,
            backoff_cap_secs: 600,
            ..Default::default()
        };
        assert_eq!(cfg.backoff_delay(0), Duration::from_secs(30));
        assert_eq!(cfg.backoff_delay(1), Duration::from_secs(60));
        assert_eq!(cfg.backoff_delay(2), Duration::from_secs(120));
        assert_eq!(cfg.backoff_delay(10), Duration::from_secs(600));
    }

    #[test]
    fn test_timeout_override() {
        let mut stages = StagesConfig::default();
        stages.timeout_secs.insert("synth-clip".to_string(), 7200);
        assert_eq!(
            stages.timeout_for(TaskKind::SynthClip),
            Duration::from_secs(7200)
        );
        assert_eq!(
            stages.timeout_for(TaskKind::Analyze),
            Duration::from_secs(3600)
        );
    }
}
