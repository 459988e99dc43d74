//! Run command — drive every submitted job to completion

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::JobSpec;
use storyreel_engine::{run_until_idle, EventSink, PipelineEvent};

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::Cli;

/// Run the scheduler until every job finishes
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Submit this document first, then run
    pub input: Option<PathBuf>,

    /// Number of scenes for a submitted document
    #[arg(short, long)]
    pub scenes: Option<u32>,

    /// Output video path for a submitted document
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of workers (default: the concurrency cap)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing run command");
        let config = load_config()?;
        let events: Arc<dyn EventSink> = Arc::new(ConsoleSink { quiet: cli.quiet });
        let scheduler = open_scheduler(&config, Some(events))?;

        if let Some(input) = &self.input {
            if !input.exists() {
                anyhow::bail!("Input document not found: {}", input.display());
            }
            let output = self.output.clone().unwrap_or_else(|| {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "video".to_string());
                config.paths.output_dir.join(format!("{stem}.mp4"))
            });
            let scenes = self.scenes.unwrap_or(config.scheduler.default_scenes);
            scheduler.submit(JobSpec::new(input, &output, scenes))?;
        }

        if !scheduler.has_live_jobs() {
            if !cli.quiet {
                output::info("No jobs to run");
            }
            return Ok(());
        }

        let workers = self
            .workers
            .unwrap_or(config.scheduler.max_concurrent_tasks);
        run_until_idle(scheduler.clone(), workers).await?;

        if !cli.quiet {
            for job in scheduler.list_jobs() {
                let styled = output::job_state_style(job.state).apply_to(job.state);
                println!("  {} {}", style(job.id).cyan(), styled);
            }
        }
        Ok(())
    }
}

/// Prints pipeline progress to the console as it happens
struct ConsoleSink {
    quiet: bool,
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: PipelineEvent) {
        if self.quiet {
            return;
        }
        match event {
            PipelineEvent::TaskSucceeded { task } => {
                println!("{} {}", style("✓").green(), task.name);
            }
            PipelineEvent::TaskFailed {
                task,
                error,
                will_retry,
            } => {
                let note = if will_retry { " (will retry)" } else { "" };
                println!(
                    "{} {}: {}{}",
                    style("✗").red(),
                    task.name,
                    error.message,
                    note
                );
            }
            PipelineEvent::LeaseReclaimed { task, worker, .. } => {
                println!(
                    "{} reclaimed {} from stalled {}",
                    style("!").yellow(),
                    task.name,
                    worker
                );
            }
            PipelineEvent::JobCompleted { job, state } => {
                let styled = output::job_state_style(state).apply_to(state);
                println!("{} job {} {}", style("→").blue(), job, styled);
            }
            _ => {}
        }
    }
}
