//! Logging service

use crate::models::{LogLevel, TaskResult};
use tracing_subscriber::EnvFilter;

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = match level {
        LogLevel::Error => "infrautomater=error,infrautomater_core=error",
        LogLevel::Warn => "infrautomater=warn,infrautomater_core=warn",
        LogLevel::Info => "infrautomater=info,infrautomater_core=info",
        LogLevel::Debug => "infrautomater=debug,infrautomater_core=debug",
        LogLevel::Trace => "infrautomater=trace,infrautomater_core=trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}

/// Log the result of a task run
pub fn log_task_outcome(task: &str, attempt: u32, result: &TaskResult) {
    tracing::info!(
        task = task,
        request_id = result.request_id,
        attempt = attempt,
        status = ?result.status,
        message = result.message.as_deref().unwrap_or(""),
        "Task finished"
    );
}

/// Log a status write that could not be committed even after the second try
pub fn log_persistence_loss(request_id: i64, primary: &str, secondary: &str) {
    tracing::error!(
        request_id = request_id,
        primary = primary,
        secondary = secondary,
        "Request state could not be persisted"
    );
}
