use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_application::{
    AgentSessionManager, ChannelEventSink, QueueCoordinator, QueueService, SessionServices,
};
use cadence_core::agent::AgentLauncher;
use cadence_core::config::AppConfig;
use cadence_core::session::{ConversationRepository, SessionStatus};
use cadence_infrastructure::{SqliteStore, resolve_database_path};
use cadence_interaction::ClaudeCodeLauncher;

use crate::app::AppContext;

pub struct AppBootstrap {
    pub context: AppContext,
}

/// Sessions left streaming or compacting by a previous run have no agent
/// behind them any more; they come back as idle.
async fn reset_orphaned_sessions(conversations: &dyn ConversationRepository) -> Result<()> {
    let sessions = conversations
        .list_all()
        .await
        .context("Failed to list sessions")?;

    let mut reset_count = 0;
    for session in sessions {
        if matches!(
            session.status,
            SessionStatus::Streaming | SessionStatus::Compacting
        ) {
            conversations
                .update_status(&session.session_id, SessionStatus::Idle)
                .await
                .with_context(|| format!("Failed to reset session {}", session.session_id))?;
            reset_count += 1;
        }
    }

    if reset_count > 0 {
        tracing::info!(
            "[Bootstrap] Reset {} session(s) interrupted by the last shutdown",
            reset_count
        );
    }
    Ok(())
}

/// Composition root: opens storage and wires the services together.
pub async fn bootstrap(config: AppConfig, sink: ChannelEventSink) -> Result<AppBootstrap> {
    let launcher: Arc<dyn AgentLauncher> = Arc::new(ClaudeCodeLauncher::from_config(&config.agent));
    bootstrap_with_launcher(config, sink, launcher).await
}

pub(crate) async fn bootstrap_with_launcher(
    config: AppConfig,
    sink: ChannelEventSink,
    launcher: Arc<dyn AgentLauncher>,
) -> Result<AppBootstrap> {
    let database_path = resolve_database_path(config.storage.database_path.as_deref())
        .context("Failed to resolve database path")?;
    let store = Arc::new(
        SqliteStore::open(database_path)
            .await
            .context("Failed to open database")?,
    );
    let conversations: Arc<dyn ConversationRepository> = store.clone();

    reset_orphaned_sessions(conversations.as_ref()).await?;

    if !launcher.is_available().await {
        tracing::warn!(
            "[Bootstrap] Agent command '{}' was not found; sessions will fail to open",
            config.agent.command
        );
    }

    let queue_service = Arc::new(QueueService::new(store.clone(), conversations.clone()));
    let coordinator = Arc::new(QueueCoordinator::new(
        queue_service.clone(),
        config.queue.auto_dispatch,
    ));

    let default_working_directory = config
        .agent
        .working_directory
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok());

    let session_manager = Arc::new(AgentSessionManager::new(
        launcher,
        SessionServices {
            queue: queue_service.clone(),
            coordinator,
            conversations: conversations.clone(),
            sink: Arc::new(sink),
        },
        default_working_directory,
    ));

    tracing::info!(
        "[Bootstrap] Ready (auto-dispatch {})",
        if config.queue.auto_dispatch { "on" } else { "off" }
    );

    Ok(AppBootstrap {
        context: AppContext {
            session_manager,
            queue_service,
            conversations,
        },
    })
}
