//! Tracing subscriber setup.
//!
//! Logs always go to stderr; stdout carries search output and bridge
//! protocol lines only. A daily-rolling file can be added from settings.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{MetasearchError, Result};
use crate::settings::LoggingSettings;

/// Keeps the file writer flushing. Hold it for the life of the process.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter: `RUST_LOG` if set, else the configured directive.
///
/// # Errors
///
/// Returns [`MetasearchError::Config`] if the configured directive is invalid.
pub fn env_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| MetasearchError::Config(format!("logging.filter: {e}"))),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<LogGuard> {
    let filter = env_filter(settings)?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match &settings.file {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "metasearch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MetasearchError::Config(format!("failed to install logger: {e}")))?;

    if let Some(dir) = &settings.file {
        tracing::debug!(dir = %dir.display(), "file logging enabled");
    }
    Ok(LogGuard { _file: guard })
}
