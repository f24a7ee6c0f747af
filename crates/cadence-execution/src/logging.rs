//! Global subscriber setup.

use crate::tracing_layer::{DiagnosticEvent, DiagnosticsLayer};
use cadence_core::config::LoggingConfig;
use cadence_core::{CadenceError, Result};
use std::path::Path;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "cadence.log";

/// Keeps the file writer flushing. Drop it only at shutdown.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Installs the global subscriber.
///
/// Logs go to stderr, and also to a daily-rolling file under `logs_dir` when
/// file logging is enabled. With `diagnostics` set, warnings and errors are
/// forwarded to that channel as well.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging(
    config: &LoggingConfig,
    logs_dir: Option<&Path>,
    diagnostics: Option<mpsc::UnboundedSender<DiagnosticEvent>>,
) -> Result<LoggingGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .boxed();

    let (file_layer, file_guard) = match logs_dir {
        Some(dir) if config.file => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let diagnostics_layer = diagnostics.map(DiagnosticsLayer::new);

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(stderr_layer)
        .with(file_layer)
        .with(diagnostics_layer)
        .try_init()
        .map_err(|e| CadenceError::config(format!("Failed to install logger: {}", e)))?;

    tracing::debug!("[Config] logging initialised at {}", config.level);
    Ok(LoggingGuard { _file: file_guard })
}

