mod app;
mod bridge;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use cadence_application::ChannelEventSink;
use cadence_execution::init_logging;
use cadence_infrastructure::{CadencePaths, ConfigService};
use clap::Parser;
use tokio::sync::mpsc;

use crate::app::{AppBootstrap, bootstrap};

/// Host process for the Cadence UI.
///
/// Speaks line-delimited JSON on stdin/stdout; logs go to stderr and the
/// log directory.
#[derive(Parser, Debug)]
#[command(name = "cadence-desktop", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database, overriding the config
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level or filter directive, overriding the config
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new()?,
    };
    let mut config = config_service.get_config()?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(database) = cli.database {
        config.storage.database_path = Some(database.to_string_lossy().into_owned());
    }

    let (diagnostics_tx, diagnostics_rx) = mpsc::unbounded_channel();
    let logs_dir = CadencePaths::logs_dir().ok();
    let _logging = init_logging(&config.logging, logs_dir.as_deref(), Some(diagnostics_tx))?;
    tracing::info!("[Startup] config loaded from {}", config_service.path().display());

    let (sink, ui_events) = ChannelEventSink::channel();
    let AppBootstrap { context } = bootstrap(config, sink).await?;
    let context = Arc::new(context);

    bridge::serve(
        context.clone(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        ui_events,
        Some(diagnostics_rx),
    )
    .await?;

    context.session_manager.shutdown_all().await;
    tracing::info!("[Shutdown] all sessions closed");
    Ok(())
}
