//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{
    CancelCommand, CleanupCommand, InitCommand, ListCommand, RetryCommand, RunCommand,
    StatusCommand, SubmitCommand,
};

/// Storyreel - novel-to-video production pipeline
#[derive(Debug, Parser)]
#[command(name = "storyreel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize a new Storyreel configuration
    Init(InitCommand),

    /// Submit a document for video production
    Submit(SubmitCommand),

    /// Run the scheduler until every job finishes
    Run(RunCommand),

    /// Show the status of a job
    Status(StatusCommand),

    /// List all jobs
    List(ListCommand),

    /// Retry a failed job or task
    Retry(RetryCommand),

    /// Cancel a running job
    Cancel(CancelCommand),

    /// Remove finished jobs from the state directory
    Cleanup(CleanupCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Submit(ref cmd) => cmd.execute(&self),
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Status(ref cmd) => cmd.execute(&self),
            Commands::List(ref cmd) => cmd.execute(&self),
            Commands::Retry(ref cmd) => cmd.execute(&self),
            Commands::Cancel(ref cmd) => cmd.execute(&self),
            Commands::Cleanup(ref cmd) => cmd.execute(&self),
        }
    }
}
