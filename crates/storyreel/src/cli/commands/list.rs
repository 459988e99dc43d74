//! List command

use clap::Args;
use console::style;
use tracing::info;

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// List all jobs
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only show jobs that are still running
    #[arg(short, long)]
    pub active: bool,
}

impl ListCommand {
    /// Execute the list command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing list command");
        let config = load_config()?;
        let scheduler = open_scheduler(&config, None)?;

        let jobs: Vec<_> = scheduler
            .list_jobs()
            .into_iter()
            .filter(|j| !self.active || !j.state.is_terminal())
            .collect();

        match cli.format {
            OutputFormat::Json => {
                let payload: Vec<_> = jobs
                    .iter()
                    .map(|j| {
                        serde_json::json!({
                            "job": j.id.to_string(),
                            "state": j.state,
                            "input": j.spec.input.to_string_lossy(),
                            "output": j.spec.output.to_string_lossy(),
                            "scenes": j.spec.scenes,
                            "created_at": j.created_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            OutputFormat::Text => {
                if jobs.is_empty() {
                    if !cli.quiet {
                        output::info("No jobs");
                    }
                    return Ok(());
                }
                for job in &jobs {
                    let state = output::job_state_style(job.state).apply_to(job.state);
                    println!(
                        "  {} {:<16} {}",
                        style(job.id).cyan(),
                        state,
                        style(job.spec.input.display()).dim()
                    );
                }
            }
        }
        Ok(())
    }
}
