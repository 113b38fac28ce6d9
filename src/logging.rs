//! Logging initialization
//!
//! Installs a global `tracing` subscriber: an `EnvFilter` (the `RUST_LOG`
//! environment variable wins over the configured filter), a console fmt layer
//! and, when a log directory is configured, a daily rolling plain-text file.

use crate::config::LoggingConfig;
use crate::error::{MonitorError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log files
pub const LOG_FILE_PREFIX: &str = "reduction-monitor.log";

/// Build the filter: `RUST_LOG` if set, otherwise the configured directives
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            MonitorError::Config(format!("Invalid log filter '{}': {}", config.filter, e))
        }),
    }
}

/// Install the global subscriber
///
/// Returns the guard of the non-blocking file writer when file logging is
/// enabled; buffered lines are flushed when it is dropped, so keep it alive
/// for the lifetime of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(config)?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| MonitorError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
