//! Init command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use storyreel_core::config::defaults::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};
use storyreel_core::config::find_config;

use crate::cli::Cli;
use crate::cli::output;

/// Initialize a new Storyreel configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        if let Some(existing) = find_config(&cwd) {
            if !self.force {
                anyhow::bail!(
                    "Configuration already exists at {}. Use --force to overwrite.",
                    existing.display()
                );
            }
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                style(config_path.display()).cyan()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_core::config::load_config;
    use tempfile::TempDir;

    #[test]
    fn test_template_parses_as_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_TOML);
        std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE).unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.scheduler.max_concurrent_tasks > 0);
    }
}
