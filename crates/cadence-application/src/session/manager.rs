use super::agent_session::{AgentSession, SessionServices};
use super::cache::SessionCache;
use cadence_core::agent::{AgentLauncher, LaunchRequest, TransportEvent};
use cadence_core::session::{
    ConversationMessage, ConversationRepository, NewSession, Session, SessionStatus,
};
use cadence_core::turn::TurnStats;
use cadence_core::{CadenceError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Owns every live session and its agent process.
///
/// `AgentSessionManager` is responsible for:
/// - Opening new sessions (conversation row + agent process)
/// - Restoring stored sessions with their pending queue
/// - Feeding each session's transport events to it in arrival order
/// - Closing, deleting and shutting sessions down
pub struct AgentSessionManager {
    sessions: SessionCache,
    launcher: Arc<dyn AgentLauncher>,
    services: SessionServices,
    default_working_directory: Option<PathBuf>,
}

impl AgentSessionManager {
    pub fn new(
        launcher: Arc<dyn AgentLauncher>,
        services: SessionServices,
        default_working_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            sessions: SessionCache::new(),
            launcher,
            services,
            default_working_directory,
        }
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Creates a conversation and launches its agent.
    ///
    /// # Arguments
    ///
    /// * `working_directory` - Directory the agent runs in; falls back to the
    ///   configured default
    /// * `api_profile_id` - Opaque profile reference stored with the session
    ///
    /// # Errors
    ///
    /// Returns an error if no working directory is known, the conversation
    /// cannot be stored, or the agent fails to start. A failed launch removes
    /// the conversation row again.
    pub async fn open(
        &self,
        working_directory: Option<String>,
        api_profile_id: Option<String>,
    ) -> Result<Arc<AgentSession>> {
        let working_directory = working_directory
            .map(PathBuf::from)
            .or_else(|| self.default_working_directory.clone())
            .ok_or_else(|| CadenceError::invalid_input("no working directory given"))?;

        let session_id = Uuid::new_v4().to_string();
        self.services
            .conversations
            .create(&NewSession {
                session_id: session_id.clone(),
                working_directory: working_directory.to_string_lossy().into_owned(),
                api_profile_id,
                title: None,
            })
            .await?;

        match self
            .start(&session_id, working_directory, TurnStats::default(), false)
            .await
        {
            Ok(session) => {
                tracing::info!("[Session] opened {}", session_id);
                Ok(session)
            }
            Err(e) => {
                if let Err(cleanup) = self.services.conversations.delete(&session_id).await {
                    tracing::error!(
                        "[Session] {} could not remove row after failed launch: {}",
                        session_id,
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Brings a stored session back to life in the Idle state.
    ///
    /// Returns the live session directly if it is already running.
    pub async fn restore(&self, session_id: &str) -> Result<Arc<AgentSession>> {
        if let Some(session) = self.sessions.get(session_id).await {
            return Ok(session);
        }

        let row = self
            .services
            .conversations
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| CadenceError::not_found("Session", session_id))?;

        let pending = self.services.queue.restore(session_id).await?;
        let stats = TurnStats {
            total_cost_usd: row.total_cost_usd,
            turn_count: row.turn_count,
            ..TurnStats::default()
        };
        let session = self
            .start(
                session_id,
                PathBuf::from(&row.working_directory),
                stats,
                row.title.is_some(),
            )
            .await?;

        self.services
            .conversations
            .update_status(session_id, SessionStatus::Idle)
            .await?;
        tracing::info!(
            "[Session] restored {} with {} queued message(s)",
            session_id,
            pending.len()
        );
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.get(session_id).await
    }

    /// Like [`get`](Self::get), but a missing session is an error.
    pub async fn require(&self, session_id: &str) -> Result<Arc<AgentSession>> {
        self.sessions
            .get(session_id)
            .await
            .ok_or_else(|| CadenceError::not_found("Session", session_id))
    }

    /// All stored sessions, most recently updated first.
    pub async fn list(&self) -> Result<Vec<Session>> {
        self.services.conversations.list_all().await
    }

    pub async fn live_session_ids(&self) -> Vec<String> {
        self.sessions.ids().await
    }

    pub async fn messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        self.services.conversations.list_messages(session_id).await
    }

    pub async fn rename(&self, session_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CadenceError::invalid_input("title must not be empty"));
        }
        self.services
            .conversations
            .update_title(session_id, title)
            .await
    }

    /// Stops the agent and marks the conversation closed. The row, its
    /// messages and its queue are kept.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        match self.sessions.remove(session_id).await {
            Some(session) => session.close().await,
            None => {
                if self
                    .services
                    .conversations
                    .find_by_id(session_id)
                    .await?
                    .is_none()
                {
                    return Err(CadenceError::not_found("Session", session_id));
                }
                self.services.conversations.close(session_id).await
            }
        }
    }

    /// Closes the session if live and removes everything stored for it.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        if let Some(session) = self.sessions.remove(session_id).await {
            if let Err(e) = session.close().await {
                tracing::warn!("[Session] {} close before delete failed: {}", session_id, e);
            }
        }
        if !self.services.conversations.delete(session_id).await? {
            return Err(CadenceError::not_found("Session", session_id));
        }
        tracing::info!("[Session] deleted {}", session_id);
        Ok(())
    }

    /// Closes every live session. Errors are logged and do not stop the rest.
    pub async fn shutdown_all(&self) {
        for session in self.sessions.drain().await {
            if let Err(e) = session.close().await {
                tracing::error!(
                    "[Session] {} failed to close on shutdown: {}",
                    session.session_id(),
                    e
                );
            }
        }
    }

    async fn start(
        &self,
        session_id: &str,
        working_directory: PathBuf,
        stats: TurnStats,
        has_title: bool,
    ) -> Result<Arc<AgentSession>> {
        let launched = self
            .launcher
            .launch(&LaunchRequest {
                session_id: session_id.to_string(),
                working_directory,
            })
            .await?;

        let session = Arc::new(AgentSession::new(
            session_id,
            stats,
            has_title,
            launched.transport,
            &self.services,
        ));
        if let Some(previous) = self.sessions.insert(session.clone()).await {
            tracing::warn!("[Session] {} replaced a live instance", previous.session_id());
        }
        spawn_pump(session.clone(), launched.events);
        Ok(session)
    }
}

/// One task per session: events are applied strictly in arrival order.
fn spawn_pump(session: Arc<AgentSession>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            session.handle_transport_event(event).await;
        }
        tracing::debug!("[Session] {} event stream ended", session.session_id());
    });
}
