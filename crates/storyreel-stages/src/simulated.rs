//! Local simulation backend
//!
//! Stands in for the real production services during tests and `--simulate`
//! runs: every stage writes a small placeholder artifact instead of calling
//! out to an AI service. Failures and slow calls can be scripted per task.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use storyreel_core::{TaskId, TaskKind};

use crate::traits::{StageError, StageExecutor, StageOutput, StageRequest};

/// A scripted behavior consumed by the next execution of a task
#[derive(Debug, Clone)]
enum Scripted {
    /// Fail the attempt with the given error
    Fail(StageError),
    /// Stall for the given duration before succeeding
    Delay(Duration),
}

/// Simulation executor registered for every stage kind
#[derive(Debug, Default)]
pub struct SimulatedStage {
    /// Fixed latency applied to every execution
    latency: Duration,
    /// Scripted behaviors, keyed by task name, consumed front-to-back
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
    /// Every task this stage was invoked for, in order
    invocations: Mutex<Vec<TaskId>>,
}

impl SimulatedStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Script the next execution of `task_name` to fail with `error`
    pub fn fail_next(&self, task_name: &str, error: StageError) {
        self.scripted
            .lock()
            .unwrap()
            .entry(task_name.to_string())
            .or_default()
            .push_back(Scripted::Fail(error));
    }

    /// Script the next execution of `task_name` to stall for `delay`
    pub fn delay_next(&self, task_name: &str, delay: Duration) {
        self.scripted
            .lock()
            .unwrap()
            .entry(task_name.to_string())
            .or_default()
            .push_back(Scripted::Delay(delay));
    }

    /// Tasks this stage has been invoked for, in invocation order
    pub fn invocations(&self) -> Vec<TaskId> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of times `task_name` was invoked
    pub fn invocation_count(&self, task_name: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.name == task_name)
            .count()
    }

    fn take_scripted(&self, task_name: &str) -> Option<Scripted> {
        self.scripted
            .lock()
            .unwrap()
            .get_mut(task_name)
            .and_then(|q| q.pop_front())
    }

    fn artifact_name(request: &StageRequest) -> String {
        let ext = match request.kind {
            TaskKind::Analyze => "storyboard.json",
            TaskKind::ScriptScene => "script.json",
            TaskKind::SynthVoice => "voice.wav",
            TaskKind::SynthImage => "image.png",
            TaskKind::SynthClip => "clip.mp4",
            TaskKind::AssembleScene => "scene.mp4",
            TaskKind::AssembleFinal => "final.mp4",
        };
        format!("{}.{}", request.task.name, ext)
    }

    fn write_artifact(request: &StageRequest) -> Result<PathBuf, StageError> {
        let path = if request.kind == TaskKind::AssembleFinal {
            request.output.clone()
        } else {
            request.workdir.join(Self::artifact_name(request))
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StageError::Transient(format!("creating artifact dir: {e}")))?;
        }

        let content = match request.kind {
            TaskKind::Analyze | TaskKind::ScriptScene => json!({
                "stage": request.kind.as_str(),
                "scene": request.scene,
                "input": request.input,
                "upstream": request.upstream,
            })
            .to_string(),
            _ => format!(
                "simulated {} artifact for {}\n",
                request.kind, request.task
            ),
        };

        std::fs::write(&path, content)
            .map_err(|e| StageError::Transient(format!("writing artifact: {e}")))?;
        Ok(path)
    }
}

#[async_trait]
impl StageExecutor for SimulatedStage {
    async fn execute(&self, request: StageRequest) -> Result<StageOutput, StageError> {
        self.invocations.lock().unwrap().push(request.task.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.take_scripted(&request.task.name) {
            Some(Scripted::Fail(error)) => {
                debug!(task = %request.task, %error, "scripted failure");
                return Err(error);
            }
            Some(Scripted::Delay(delay)) => {
                debug!(task = %request.task, delay_ms = delay.as_millis() as u64, "scripted stall");
                tokio::time::sleep(delay).await;
            }
            None => {}
        }

        let artifact = Self::write_artifact(&request)?;
        debug!(task = %request.task, artifact = %artifact.display(), "simulated stage complete");
        Ok(StageOutput { artifact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_core::JobId;
    use tempfile::TempDir;

    fn request(temp: &TempDir, kind: TaskKind, name: &str) -> StageRequest {
        StageRequest {
            task: TaskId::new(JobId::new(), name),
            kind,
            scene: None,
            input: temp.path().join("novel.txt"),
            upstream: Vec::new(),
            workdir: temp.path().join("work"),
            output: temp.path().join("out").join("final.mp4"),
            deadline: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_simulated_stage_writes_artifact() {
        let temp = TempDir::new().unwrap();
        let stage = SimulatedStage::new();

        let output = stage
            .execute(request(&temp, TaskKind::SynthVoice, "synth-voice-1"))
            .await
            .unwrap();

        assert!(output.artifact.exists());
        assert!(output.artifact.to_string_lossy().ends_with("voice.wav"));
    }

    #[tokio::test]
    async fn test_final_assembly_writes_to_output() {
        let temp = TempDir::new().unwrap();
        let stage = SimulatedStage::new();

        let output = stage
            .execute(request(&temp, TaskKind::AssembleFinal, "assemble-final"))
            .await
            .unwrap();

        assert_eq!(output.artifact, temp.path().join("out").join("final.mp4"));
        assert!(output.artifact.exists());
    }

    #[tokio::test]
    async fn test_scripted_failure_consumed_once() {
        let temp = TempDir::new().unwrap();
        let stage = SimulatedStage::new();
        stage.fail_next("analyze", StageError::Transient("rate limited".into()));

        let err = stage
            .execute(request(&temp, TaskKind::Analyze, "analyze"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Transient(_)));

        // Second attempt succeeds
        stage
            .execute(request(&temp, TaskKind::Analyze, "analyze"))
            .await
            .unwrap();
        assert_eq!(stage.invocation_count("analyze"), 2);
    }
}
