//! Job and task types shared across the pipeline engine

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job (one input document, one output video)
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh job id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job id from its string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task within a job
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Owning job
    pub job: JobId,
    /// Task name within the job (e.g., "analyze", "synth-voice-3")
    pub name: String,
}

impl TaskId {
    /// Create a new task ID
    pub fn new(job: JobId, name: impl Into<String>) -> Self {
        Self {
            job,
            name: name.into(),
        }
    }

    /// Parse a task ID from "job:name" format
    pub fn parse(s: &str) -> Option<Self> {
        let (job, name) = s.split_once(':')?;
        Some(Self::new(JobId::parse(job)?, name))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.job, self.name)
    }
}

/// The closed set of pipeline stage kinds.
///
/// Adding a stage means adding one variant here and registering one executor
/// for it in the stage registry.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Analyze the input document into a storyboard
    Analyze,
    /// Script a single scene from the storyboard
    ScriptScene,
    /// Synthesize the voice-over for a scene
    SynthVoice,
    /// Synthesize the key image for a scene
    SynthImage,
    /// Synthesize the motion clip for a scene from its image
    SynthClip,
    /// Assemble one scene (clip + voice + subtitles)
    AssembleScene,
    /// Assemble the final video from all scenes
    AssembleFinal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::ScriptScene => "script-scene",
            Self::SynthVoice => "synth-voice",
            Self::SynthImage => "synth-image",
            Self::SynthClip => "synth-clip",
            Self::AssembleScene => "assemble-scene",
            Self::AssembleFinal => "assemble-final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyze" => Some(Self::Analyze),
            "script-scene" => Some(Self::ScriptScene),
            "synth-voice" => Some(Self::SynthVoice),
            "synth-image" => Some(Self::SynthImage),
            "synth-clip" => Some(Self::SynthClip),
            "assemble-scene" => Some(Self::AssembleScene),
            "assemble-final" => Some(Self::AssembleFinal),
            _ => None,
        }
    }

    /// All stage kinds, in pipeline order
    pub fn all() -> [TaskKind; 7] {
        [
            Self::Analyze,
            Self::ScriptScene,
            Self::SynthVoice,
            Self::SynthImage,
            Self::SynthClip,
            Self::AssembleScene,
            Self::AssembleFinal,
        ]
    }

    /// Whether this stage runs once per scene (as opposed to once per job)
    pub fn per_scene(&self) -> bool {
        !matches!(self, Self::Analyze | Self::AssembleFinal)
    }

    /// Task name for a concrete instance of this stage
    pub fn instance_name(&self, scene: Option<u32>) -> String {
        match scene {
            Some(n) => format!("{}-{}", self.as_str(), n),
            None => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Created, waiting for predecessors
    Pending,
    /// All predecessors succeeded; eligible for leasing
    Runnable,
    /// Leased to a worker
    Leased,
    /// Completed successfully
    Succeeded,
    /// Terminally failed
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl TaskState {
    /// Whether this state is terminal (the task will never run again)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Runnable => "runnable",
            Self::Leased => "leased",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Job lifecycle states, derived from the states of the job's tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// At least one task has not reached a terminal state
    Running,
    /// Every task succeeded
    Succeeded,
    /// A required task permanently failed
    Failed,
    /// Independent branches succeeded but at least one did not
    PartiallyFailed,
    /// Cancelled by request
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially-failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Classification of a task failure, driving retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Network/rate-limit style failure from a stage collaborator; retryable
    Transient,
    /// Invalid input or unsupported content; fails the task immediately
    Permanent,
    /// Execution exceeded the task's timeout; retryable
    Timeout,
    /// A predecessor permanently failed; no attempt consumed
    DependencyFailed,
}

impl FailureKind {
    /// Whether a failure of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
            Self::DependencyFailed => "dependency-failed",
        };
        f.write_str(s)
    }
}

/// An error recorded against a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable message
    pub message: String,
}

impl TaskError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn dependency_failed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::DependencyFailed, message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Queue priority tier. FIFO within a tier; higher tiers are leased first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Specification of a submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Input document path
    pub input: PathBuf,
    /// Output video path
    pub output: PathBuf,
    /// Number of scenes the storyboard is scripted into
    pub scenes: u32,
    /// Queue priority for all of this job's tasks
    #[serde(default)]
    pub priority: Priority,
}

impl JobSpec {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, scenes: u32) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            scenes,
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display_and_parse() {
        let job = JobId::new();
        let id = TaskId::new(job, "synth-voice-2");
        let parsed = TaskId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_task_id_parse_invalid() {
        assert!(TaskId::parse("no-colon").is_none());
        assert!(TaskId::parse("not-a-uuid:analyze").is_none());
    }

    #[test]
    fn test_task_kind_roundtrip() {
        for kind in TaskKind::all() {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::parse("mux"), None);
    }

    #[test]
    fn test_instance_name() {
        assert_eq!(TaskKind::Analyze.instance_name(None), "analyze");
        assert_eq!(
            TaskKind::SynthClip.instance_name(Some(3)),
            "synth-clip-3"
        );
    }

    #[test]
    fn test_per_scene_kinds() {
        assert!(!TaskKind::Analyze.per_scene());
        assert!(!TaskKind::AssembleFinal.per_scene());
        assert!(TaskKind::SynthVoice.per_scene());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Leased.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::PartiallyFailed.is_terminal());
    }

    #[test]
    fn test_failure_retryability() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::Permanent.is_retryable());
        assert!(!FailureKind::DependencyFailed.is_retryable());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
