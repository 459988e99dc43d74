//! Submit command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::{JobSpec, Priority};

use crate::cli::commands::{load_config, open_scheduler};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Job priority, from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PriorityArg {
    Low,
    #[default]
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

/// Submit a document for video production
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// Input document (novel text)
    pub input: PathBuf,

    /// Output video path (default: <output_dir>/<input stem>.mp4)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of scenes to produce
    #[arg(short, long)]
    pub scenes: Option<u32>,

    /// Scheduling priority
    #[arg(short, long, default_value = "normal")]
    pub priority: PriorityArg,
}

impl SubmitCommand {
    /// Execute the submit command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(input = %self.input.display(), "executing submit command");
        let config = load_config()?;

        if !self.input.exists() {
            anyhow::bail!("Input document not found: {}", self.input.display());
        }

        let output = self.output.clone().unwrap_or_else(|| {
            let stem = self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "video".to_string());
            config.paths.output_dir.join(format!("{stem}.mp4"))
        });
        let scenes = self.scenes.unwrap_or(config.scheduler.default_scenes);

        let scheduler = open_scheduler(&config, None)?;
        let spec = JobSpec::new(&self.input, &output, scenes).with_priority(self.priority.into());
        let job = scheduler.submit(spec)?;

        match cli.format {
            OutputFormat::Json => {
                let payload = serde_json::json!({
                    "job": job.id.to_string(),
                    "input": self.input.to_string_lossy(),
                    "output": output.to_string_lossy(),
                    "scenes": scenes,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!("Submitted job {}", style(job.id).cyan()));
                    println!("{}", output::key_value("input", &self.input.display().to_string()));
                    println!("{}", output::key_value("output", &output.display().to_string()));
                    println!("{}", output::key_value("scenes", &scenes.to_string()));
                    output::info("Run `storyreel run` to start production");
                }
            }
        }
        Ok(())
    }
}
