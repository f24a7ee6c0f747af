use async_trait::async_trait;
use cadence_application::{
    AgentSessionManager, ChannelEventSink, QueueCoordinator, QueueService, SendOutcome,
    SessionServices,
};
use cadence_core::agent::{AgentLauncher, AgentTransport, LaunchRequest, LaunchedAgent, TransportEvent};
use cadence_core::protocol::{Frame, OutboundMessage};
use cadence_core::session::{SessionStatus, UiEvent};
use cadence_core::turn::TurnState;
use cadence_core::{CadenceError, Result};
use cadence_infrastructure::SqliteStore;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    closed: AtomicBool,
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CadenceError::transport("agent stopped"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

struct Agent {
    transport: Arc<FakeTransport>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Launches fake agents whose output the test writes by hand.
#[derive(Default)]
struct FakeLauncher {
    agents: Mutex<HashMap<String, Agent>>,
    refuse: AtomicBool,
}

impl FakeLauncher {
    fn emit(&self, session_id: &str, record: Value) {
        let agents = self.agents.lock().unwrap();
        agents[session_id]
            .events
            .send(TransportEvent::Frame(Frame::Record(record)))
            .unwrap();
    }

    fn sent(&self, session_id: &str) -> Vec<String> {
        let agents = self.agents.lock().unwrap();
        let sent = agents[session_id].transport.sent.lock().unwrap();
        sent.iter()
            .filter_map(|m| match m {
                OutboundMessage::Message { content } => Some(content.clone()),
                OutboundMessage::Interrupt => None,
            })
            .collect()
    }
}

#[async_trait]
impl AgentLauncher for FakeLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CadenceError::Agent("command not found".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport::default());
        self.agents.lock().unwrap().insert(
            request.session_id.clone(),
            Agent {
                transport: transport.clone(),
                events: tx,
            },
        );
        Ok(LaunchedAgent {
            transport,
            events: rx,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct Harness {
    manager: AgentSessionManager,
    launcher: Arc<FakeLauncher>,
    queue: Arc<QueueService>,
    events: mpsc::UnboundedReceiver<UiEvent>,
}

impl Harness {
    fn new(store: Arc<SqliteStore>, auto_dispatch: bool) -> Self {
        let queue = Arc::new(QueueService::new(store.clone(), store.clone()));
        let coordinator = Arc::new(QueueCoordinator::new(queue.clone(), auto_dispatch));
        let (sink, events) = ChannelEventSink::channel();
        let launcher = Arc::new(FakeLauncher::default());
        let services = SessionServices {
            queue: queue.clone(),
            coordinator,
            conversations: store,
            sink: Arc::new(sink),
        };
        let manager = AgentSessionManager::new(launcher.clone(), services, Some("/tmp".into()));
        Self {
            manager,
            launcher,
            queue,
            events,
        }
    }

    /// Waits until the UI has seen `count` turn results.
    async fn wait_for_results(&mut self, count: usize) {
        let mut seen = 0;
        while seen < count {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for a turn result")
                .expect("event channel closed");
            if event.name() == "result" {
                seen += 1;
            }
        }
    }
}

fn natural_stop(text: &str) -> Vec<Value> {
    vec![
        json!({"type": "stream_event", "event": {"type": "message_start", "message": {"id": "m"}}}),
        json!({"type": "stream_event", "event": {
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": text}
        }}),
        json!({"type": "stream_event", "event": {"type": "message_delta", "delta": {"stop_reason": "end_turn"}}}),
        json!({"type": "stream_event", "event": {"type": "message_stop"}}),
    ]
}

#[tokio::test]
async fn queued_message_goes_out_after_natural_completion() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut h = Harness::new(store.clone(), true);
    let session = h.manager.open(None, None).await.unwrap();
    let id = session.session_id().to_string();

    session.send_message("first").await.unwrap();
    let queued = session.send_message("A").await.unwrap();
    assert!(matches!(queued, SendOutcome::Queued(_)));

    for record in natural_stop("done") {
        h.launcher.emit(&id, record);
    }
    h.wait_for_results(1).await;

    // Taking the session lock waits for the pump to finish the dispatch.
    assert_eq!(session.state().await, TurnState::Streaming);
    assert_eq!(h.launcher.sent(&id), vec!["first", "A"]);
    assert!(h.queue.list(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn interrupted_turn_keeps_the_queue() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let h = Harness::new(store, true);
    let session = h.manager.open(None, None).await.unwrap();
    let id = session.session_id().to_string();

    session.send_message("first").await.unwrap();
    session.send_message("later").await.unwrap();
    session.interrupt().await.unwrap();

    assert_eq!(h.launcher.sent(&id), vec!["first"]);
    assert_eq!(h.queue.list(&id).await.unwrap().len(), 1);
    assert_eq!(session.state().await, TurnState::Idle);
}

#[tokio::test]
async fn failed_launch_leaves_no_conversation() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let h = Harness::new(store, true);
    h.launcher.refuse.store(true, Ordering::SeqCst);

    let err = h.manager.open(None, None).await.err().unwrap();

    assert!(matches!(err, CadenceError::Agent(_)));
    assert!(h.manager.list().await.unwrap().is_empty());
    assert!(h.manager.live_session_ids().await.is_empty());
}

#[tokio::test]
async fn queue_and_accounting_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cadence.db");

    let id = {
        let store = Arc::new(SqliteStore::open(db.clone()).await.unwrap());
        let mut h = Harness::new(store, true);
        let session = h.manager.open(None, None).await.unwrap();
        let id = session.session_id().to_string();

        session.send_message("hello").await.unwrap();
        session.send_message("pending one").await.unwrap();
        session.send_message("pending two").await.unwrap();
        h.launcher.emit(
            &id,
            json!({"type": "result", "is_error": false, "result": "hi", "total_cost_usd": 0.75}),
        );
        h.wait_for_results(1).await;
        // The first pending item was dispatched; stop before it finishes.
        session.interrupt().await.unwrap();
        h.manager.shutdown_all().await;
        id
    };

    let store = Arc::new(SqliteStore::open(db.clone()).await.unwrap());
    let h = Harness::new(store, true);
    let session = h.manager.restore(&id).await.unwrap();

    assert_eq!(session.state().await, TurnState::Idle);
    let stats = session.snapshot().await.stats;
    assert_eq!(stats.total_cost_usd, 0.75);
    assert_eq!(stats.turn_count, 1);

    let pending: Vec<_> = h
        .queue
        .list(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.content)
        .collect();
    assert_eq!(pending, vec!["pending two"]);

    let row = h.manager.list().await.unwrap().remove(0);
    assert_eq!(row.status, SessionStatus::Idle);
    assert_eq!(row.title.as_deref(), Some("hello"));
}

#[tokio::test]
async fn close_and_delete() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let h = Harness::new(store, true);
    let session = h.manager.open(None, None).await.unwrap();
    let id = session.session_id().to_string();
    h.queue.enqueue(&id, "kept until delete").await.unwrap();

    h.manager.close(&id).await.unwrap();
    assert!(h.manager.get(&id).await.is_none());
    let row = h.manager.list().await.unwrap().remove(0);
    assert_eq!(row.status, SessionStatus::Closed);
    assert_eq!(h.queue.list(&id).await.unwrap().len(), 1);

    h.manager.delete(&id).await.unwrap();
    assert!(h.manager.list().await.unwrap().is_empty());
    assert!(h.queue.list(&id).await.unwrap().is_empty());
    assert!(h.manager.delete(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let h = Harness::new(store, true);

    assert!(h.manager.require("nope").await.err().unwrap().is_not_found());
    assert!(h.manager.restore("nope").await.err().unwrap().is_not_found());
    assert!(h.manager.close("nope").await.unwrap_err().is_not_found());
}
