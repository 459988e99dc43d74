//! CLI commands

mod cancel;
mod cleanup;
mod init;
mod list;
mod retry;
mod run;
mod status;
mod submit;

pub use cancel::CancelCommand;
pub use cleanup::CleanupCommand;
pub use init::InitCommand;
pub use list::ListCommand;
pub use retry::RetryCommand;
pub use run::RunCommand;
pub use status::StatusCommand;
pub use submit::SubmitCommand;

use std::sync::Arc;

use storyreel_core::config::{load_config_or_default, validate_config, Config};
use storyreel_engine::{EventSink, Scheduler, TaskStore, TracingSink};
use storyreel_stages::StageRegistry;

/// Load and validate the configuration for the current directory
pub(crate) fn load_config() -> anyhow::Result<Config> {
    let cwd = std::env::current_dir()?;
    let (config, _) = load_config_or_default(&cwd);
    validate_config(&config)?;
    Ok(config)
}

/// Open the durable store and build a scheduler over it.
///
/// The only stage backend shipped is the local simulation; production
/// service executors register here once they exist.
pub(crate) fn open_scheduler(
    config: &Config,
    events: Option<Arc<dyn EventSink>>,
) -> anyhow::Result<Arc<Scheduler>> {
    let store = Arc::new(TaskStore::open(&config.paths.data_dir)?);
    let (registry, _) = StageRegistry::simulated();
    let events = events.unwrap_or_else(|| Arc::new(TracingSink));
    let scheduler = Scheduler::new(config.clone(), store, registry, events)?;
    Ok(Arc::new(scheduler))
}
