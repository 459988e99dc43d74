//! Retry command

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::{JobId, TaskId};

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::Cli;

/// Retry a failed job or task
#[derive(Debug, Args)]
pub struct RetryCommand {
    /// Job identifier
    pub job: String,

    /// Retry only this task (and the dependents its failure doomed)
    #[arg(short, long)]
    pub task: Option<String>,
}

impl RetryCommand {
    /// Execute the retry command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(job = %self.job, task = ?self.task, "executing retry command");
        let job_id = JobId::parse(&self.job)
            .ok_or_else(|| anyhow::anyhow!("Invalid job id: {}", self.job))?;

        let config = load_config()?;
        let scheduler = open_scheduler(&config, None)?;

        match &self.task {
            Some(name) => {
                let task = TaskId::new(job_id, name.as_str());
                scheduler.retry_task(&task)?;
                if !cli.quiet {
                    output::success(&format!("Reset task {}", style(&task.name).cyan()));
                }
            }
            None => {
                scheduler.retry(job_id)?;
                if !cli.quiet {
                    output::success(&format!("Reset job {}", style(job_id).cyan()));
                }
            }
        }
        if !cli.quiet {
            output::info("Run `storyreel run` to resume production");
        }
        Ok(())
    }
}
