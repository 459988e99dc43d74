//! Cleanup command

use clap::Args;
use tracing::info;

use crate::cli::commands::load_config;
use crate::cli::output;
use crate::cli::Cli;
use storyreel_engine::TaskStore;

/// Remove finished jobs from the state directory
#[derive(Debug, Args)]
pub struct CleanupCommand {}

impl CleanupCommand {
    /// Execute the cleanup command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing cleanup command");
        let config = load_config()?;
        let store = TaskStore::open(&config.paths.data_dir)?;
        let removed = store.cleanup_finished_jobs()?;

        if !cli.quiet {
            if removed == 0 {
                output::info("No finished jobs to remove");
            } else {
                output::success(&format!("Removed {removed} finished job(s)"));
            }
        }
        Ok(())
    }
}
