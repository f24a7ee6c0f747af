use crate::queue::{AutoDispatch, QueueCoordinator, QueueService, TurnStarter};
use async_trait::async_trait;
use cadence_core::agent::{AgentTransport, TransportEvent};
use cadence_core::protocol::{AgentEvent, Frame, OutboundMessage, ProtocolDispatcher};
use cadence_core::queue::{QueueItem, validate_content};
use cadence_core::session::{
    ConversationRepository, EventSink, MessageRole, SessionStatus, UiEvent, UiEventKind,
};
use cadence_core::turn::{Disposition, TurnEnd, TurnState, TurnStateMachine, TurnStats, TurnTransition};
use cadence_core::{CadenceError, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

const TITLE_MAX_CHARS: usize = 50;

/// Result of a user send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "item", rename_all = "camelCase")]
pub enum SendOutcome {
    /// The session was idle and the message went to the agent.
    Sent,
    /// A turn was running; the message waits in the queue.
    Queued(QueueItem),
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: TurnState,
    pub interrupted: bool,
    pub stats: TurnStats,
    pub history_len: usize,
    pub agent_running: bool,
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionServices {
    pub queue: Arc<QueueService>,
    pub coordinator: Arc<QueueCoordinator>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub sink: Arc<dyn EventSink>,
}

struct SessionInner {
    machine: TurnStateMachine,
    dispatcher: ProtocolDispatcher,
    has_title: bool,
    closed: bool,
}

/// Coordinates one conversation with one agent process.
///
/// All state changes happen under `inner`, so user commands and inbound
/// events of the same session are applied one at a time and in order.
pub struct AgentSession {
    session_id: String,
    inner: Mutex<SessionInner>,
    transport: Arc<dyn AgentTransport>,
    queue: Arc<QueueService>,
    coordinator: Arc<QueueCoordinator>,
    conversations: Arc<dyn ConversationRepository>,
    sink: Arc<dyn EventSink>,
}

impl AgentSession {
    pub fn new(
        session_id: impl Into<String>,
        stats: TurnStats,
        has_title: bool,
        transport: Arc<dyn AgentTransport>,
        services: &SessionServices,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            inner: Mutex::new(SessionInner {
                machine: TurnStateMachine::with_stats(session_id.clone(), stats),
                dispatcher: ProtocolDispatcher::new(),
                has_title,
                closed: false,
            }),
            session_id,
            transport,
            queue: services.queue.clone(),
            coordinator: services.coordinator.clone(),
            conversations: services.conversations.clone(),
            sink: services.sink.clone(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn state(&self) -> TurnState {
        self.inner.lock().await.machine.state()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: inner.machine.state(),
            interrupted: inner.machine.interrupted(),
            stats: inner.machine.stats().clone(),
            history_len: inner.dispatcher.history().len(),
            agent_running: self.transport.is_alive(),
        }
    }

    /// Protocol history of this session as JSON lines.
    pub async fn export_history(&self) -> Result<String> {
        self.inner.lock().await.dispatcher.export_history()
    }

    /// Sends now when idle, queues while streaming, rejects while compacting.
    pub async fn send_message(&self, content: &str) -> Result<SendOutcome> {
        validate_content(content)?;
        let mut inner = self.inner.lock().await;
        self.ensure_open(&inner)?;

        match inner.machine.state() {
            TurnState::Idle => {
                self.start_turn(&mut inner, content).await?;
                Ok(SendOutcome::Sent)
            }
            TurnState::Streaming => {
                let item = self.queue.enqueue(&self.session_id, content).await?;
                Ok(SendOutcome::Queued(item))
            }
            TurnState::Compacting => {
                Err(CadenceError::busy(&self.session_id, TurnState::Compacting))
            }
        }
    }

    /// Sends every pending item as one message and clears the queue.
    ///
    /// Returns how many items were sent; zero leaves everything untouched.
    pub async fn send_queue_now(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&inner)?;
        if inner.machine.state() != TurnState::Idle {
            return Err(CadenceError::busy(&self.session_id, inner.machine.state()));
        }

        let queue = self.queue.lock(&self.session_id).await;
        let items = queue.list().await?;
        if items.is_empty() {
            return Ok(0);
        }
        let joined = items
            .iter()
            .map(|item| item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.start_turn(&mut inner, &joined).await?;
        queue.clear().await?;
        tracing::info!("[Queue] {} sent {} queued item(s) at once", self.session_id, items.len());
        Ok(items.len())
    }

    /// Ends the running turn locally and asks the agent to stop.
    ///
    /// Returns `false` if nothing was running. Never auto-dispatches.
    pub async fn interrupt(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(transition) = inner.machine.interrupt() else {
            return Ok(false);
        };

        if let Err(e) = self.transport.send(&OutboundMessage::Interrupt).await {
            tracing::warn!("[Turn] {} interrupt signal not delivered: {}", self.session_id, e);
        }
        tracing::info!("[Turn] {} interrupted", self.session_id);
        self.finish_turn(&mut inner, transition).await;
        Ok(true)
    }

    /// Starts context compaction. Rejected unless idle.
    pub async fn compact(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&inner)?;
        let generation = inner.machine.begin_compaction()?;

        if let Err(e) = self.transport.send(&OutboundMessage::compact()).await {
            inner.machine.abort(generation);
            return Err(e);
        }
        self.publish_status(SessionStatus::Compacting).await;
        Ok(())
    }

    /// Applies one transport event. Called by the session's pump task only.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        let mut inner = self.inner.lock().await;
        match event {
            TransportEvent::Frame(Frame::Record(record)) => {
                let events = inner.dispatcher.dispatch(record);
                for event in events {
                    self.apply_event(&mut inner, event).await;
                }
            }
            TransportEvent::Frame(Frame::ParseError { message, .. }) => {
                tracing::warn!("[Agent] {} skipped malformed output: {}", self.session_id, message);
            }
            TransportEvent::Exited { code } => {
                tracing::warn!("[Agent] {} process exited ({:?})", self.session_id, code);
                if let Some(transition) = inner
                    .machine
                    .fail(format!("agent process exited with {:?}", code))
                {
                    self.finish_turn(&mut inner, transition).await;
                }
            }
        }
    }

    /// Marks the session closed and stops the agent.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        if let Some(transition) = inner.machine.interrupt() {
            if let Err(e) = self.transport.send(&OutboundMessage::Interrupt).await {
                tracing::debug!("[Turn] {} interrupt on close failed: {}", self.session_id, e);
            }
            self.finish_turn(&mut inner, transition).await;
        }

        self.transport.shutdown().await?;
        self.conversations.close(&self.session_id).await?;
        self.emit(UiEventKind::StatusChange {
            status: SessionStatus::Closed,
        });
        tracing::info!("[Session] {} closed", self.session_id);
        Ok(())
    }

    fn ensure_open(&self, inner: &SessionInner) -> Result<()> {
        if inner.closed {
            return Err(CadenceError::invalid_input(format!(
                "session {} is closed",
                self.session_id
            )));
        }
        Ok(())
    }

    fn emit(&self, kind: UiEventKind) {
        self.sink.emit(UiEvent::new(self.session_id.clone(), kind));
    }

    async fn publish_status(&self, status: SessionStatus) {
        self.emit(UiEventKind::StatusChange { status });
        if let Err(e) = self.conversations.update_status(&self.session_id, status).await {
            tracing::error!("[Session] {} failed to persist status: {}", self.session_id, e);
        }
    }

    /// Begins a turn and writes the message. On a failed write the turn is
    /// rolled back and nothing is recorded.
    async fn start_turn(&self, inner: &mut SessionInner, content: &str) -> Result<()> {
        let generation = inner.machine.begin_turn()?;
        if let Err(e) = self.transport.send(&OutboundMessage::message(content)).await {
            inner.machine.abort(generation);
            tracing::warn!("[Turn] {} send failed: {}", self.session_id, e);
            return Err(e);
        }

        self.publish_status(SessionStatus::Streaming).await;
        self.emit(UiEventKind::Message {
            role: MessageRole::User,
            content: content.to_string(),
            interrupted: false,
        });
        if let Err(e) = self
            .conversations
            .append_message(&self.session_id, MessageRole::User, content, false)
            .await
        {
            tracing::error!("[Session] {} failed to store user message: {}", self.session_id, e);
        }

        if !inner.has_title {
            let title: String = content.trim().chars().take(TITLE_MAX_CHARS).collect();
            match self.conversations.update_title(&self.session_id, &title).await {
                Ok(()) => inner.has_title = true,
                Err(e) => tracing::error!("[Session] {} failed to set title: {}", self.session_id, e),
            }
        }
        Ok(())
    }

    async fn apply_event(&self, inner: &mut SessionInner, event: AgentEvent) {
        let transition = match inner.machine.apply(&event) {
            Disposition::Stale {
                accounting_changed, ..
            } => {
                if accounting_changed {
                    self.persist_accounting(inner.machine.stats()).await;
                }
                return;
            }
            Disposition::Current { transition } => transition,
        };

        match event {
            AgentEvent::SystemInit {
                agent_session_id,
                model,
            } => self.emit(UiEventKind::Init {
                agent_session_id,
                model,
            }),
            AgentEvent::Usage(usage) => self.emit(UiEventKind::Usage(usage)),
            AgentEvent::ToolProgress {
                tool_name,
                elapsed_seconds,
            } => self.emit(UiEventKind::ToolProgress {
                tool_name,
                elapsed_seconds,
            }),
            // A failing turn reports the error from `finish_turn`.
            AgentEvent::Error { message, .. } if transition.is_none() => {
                self.emit(UiEventKind::Error { message })
            }
            AgentEvent::Error { .. } | AgentEvent::Result(_) | AgentEvent::CompactBoundary => {}
            other => self.emit(UiEventKind::Stream(other)),
        }

        if let Some(transition) = transition {
            self.finish_turn(inner, transition).await;
        }
    }

    async fn finish_turn(&self, inner: &mut SessionInner, transition: TurnTransition) {
        if let Some(message) = &transition.finalized {
            self.emit(UiEventKind::Message {
                role: MessageRole::Assistant,
                content: message.content.clone(),
                interrupted: message.interrupted,
            });
            if let Err(e) = self
                .conversations
                .append_message(
                    &self.session_id,
                    MessageRole::Assistant,
                    &message.content,
                    message.interrupted,
                )
                .await
            {
                tracing::error!(
                    "[Session] {} failed to store assistant message: {}",
                    self.session_id,
                    e
                );
            }
        }

        match &transition.end {
            TurnEnd::Failed(message) => self.emit(UiEventKind::Error {
                message: message.clone(),
            }),
            TurnEnd::Compacted => self.emit(UiEventKind::Compacted),
            TurnEnd::Completed | TurnEnd::Interrupted => {}
        }

        let stats = inner.machine.stats().clone();
        self.emit(UiEventKind::Result {
            end: transition.end.clone(),
            elapsed_ms: transition.elapsed_ms,
            stats: stats.clone(),
        });
        self.publish_status(SessionStatus::Idle).await;
        self.persist_accounting(&stats).await;

        if inner.closed {
            return;
        }

        let mut starter = SessionTurnStarter {
            session: self,
            inner,
        };
        match self
            .coordinator
            .after_turn(&self.session_id, &transition.end, &mut starter)
            .await
        {
            Ok(AutoDispatch::Dispatched(item)) => {
                tracing::debug!("[Session] {} continued with queued {}", self.session_id, item.id);
            }
            Ok(AutoDispatch::Rejected { error, .. }) => self.emit(UiEventKind::Error {
                message: format!("Queued message was not sent: {}", error),
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::error!("[Queue] {} auto-dispatch failed: {}", self.session_id, e);
                self.emit(UiEventKind::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    async fn persist_accounting(&self, stats: &TurnStats) {
        if let Err(e) = self
            .conversations
            .record_turn_accounting(&self.session_id, stats.total_cost_usd, stats.turn_count)
            .await
        {
            tracing::error!("[Session] {} failed to persist accounting: {}", self.session_id, e);
        }
    }
}

/// Lets the coordinator start a turn on a session whose lock is already held.
struct SessionTurnStarter<'a> {
    session: &'a AgentSession,
    inner: &'a mut SessionInner,
}

#[async_trait]
impl TurnStarter for SessionTurnStarter<'_> {
    async fn start_turn(&mut self, content: &str) -> Result<()> {
        self.session.start_turn(self.inner, content).await
    }
}

#[cfg(test)]
#[path = "agent_session_test.rs"]
mod tests;
