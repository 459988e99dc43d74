//! Cancel command

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::JobId;

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::Cli;

/// Cancel a running job
#[derive(Debug, Args)]
pub struct CancelCommand {
    /// Job identifier
    pub job: String,
}

impl CancelCommand {
    /// Execute the cancel command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(job = %self.job, "executing cancel command");
        let job_id = JobId::parse(&self.job)
            .ok_or_else(|| anyhow::anyhow!("Invalid job id: {}", self.job))?;

        let config = load_config()?;
        let scheduler = open_scheduler(&config, None)?;
        let job = scheduler.status(job_id)?.job;
        if job.state.is_terminal() {
            anyhow::bail!("Job {} already finished ({})", job_id, job.state);
        }

        scheduler.cancel(job_id)?;
        if !cli.quiet {
            output::success(&format!("Cancelled job {}", style(job_id).cyan()));
        }
        Ok(())
    }
}
