//! Status command

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::JobId;

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Show the status of a job
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Job identifier
    pub job: String,
}

impl StatusCommand {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(job = %self.job, "executing status command");
        let job_id = JobId::parse(&self.job)
            .ok_or_else(|| anyhow::anyhow!("Invalid job id: {}", self.job))?;

        let config = load_config()?;
        let scheduler = open_scheduler(&config, None)?;
        let status = scheduler.status(job_id)?;

        match cli.format {
            OutputFormat::Json => {
                let payload = serde_json::json!({
                    "job": status.job.id.to_string(),
                    "state": status.job.state,
                    "progress": status.progress,
                    "created_at": status.job.created_at,
                    "completed_at": status.job.completed_at,
                    "error": status.job.last_error.as_ref().map(|e| serde_json::json!({
                        "task": e.task.name,
                        "kind": e.error.kind,
                        "message": e.error.message,
                    })),
                    "tasks": status.tasks.iter().map(|t| serde_json::json!({
                        "name": t.id.name,
                        "state": t.state,
                        "attempts": t.attempts,
                        "result": t.result.as_ref().map(|p| p.to_string_lossy().to_string()),
                        "error": t.last_error.as_ref().map(|e| e.message.clone()),
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            OutputFormat::Text => {
                println!("{}", output::header(&format!("Job {}", status.job.id)));
                let state = output::job_state_style(status.job.state).apply_to(status.job.state);
                println!("{}", output::key_value("state", &state.to_string()));
                println!(
                    "{}",
                    output::key_value("progress", &format!("{:.0}%", status.progress * 100.0))
                );
                if let Some(error) = &status.job.last_error {
                    println!(
                        "{}",
                        output::key_value(
                            "failed at",
                            &format!("{}: {}", error.task.name, error.error.message)
                        )
                    );
                }
                println!();
                for task in &status.tasks {
                    let state = output::task_state_style(task.state).apply_to(task.state);
                    let attempts = if task.attempts > 1 {
                        format!(" ({} attempts)", task.attempts)
                    } else {
                        String::new()
                    };
                    println!(
                        "  {:<20} {}{}",
                        task.id.name,
                        state,
                        style(attempts).dim()
                    );
                }
            }
        }
        Ok(())
    }
}
