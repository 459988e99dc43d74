//! Output formatting utilities

use console::{style, Style};

use storyreel_core::{JobState, TaskState};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for a task state
pub fn task_state_style(state: TaskState) -> Style {
    match state {
        TaskState::Succeeded => Style::new().green(),
        TaskState::Failed => Style::new().red(),
        TaskState::Cancelled => Style::new().yellow(),
        TaskState::Leased => Style::new().cyan(),
        TaskState::Runnable | TaskState::Pending => Style::new().dim(),
    }
}

/// Style for a job state
pub fn job_state_style(state: JobState) -> Style {
    match state {
        JobState::Succeeded => Style::new().green(),
        JobState::Failed => Style::new().red(),
        JobState::PartiallyFailed => Style::new().yellow(),
        JobState::Cancelled => Style::new().yellow(),
        JobState::Running => Style::new().cyan(),
    }
}
