use crate::protocol::{AgentEvent, TokenUsage};
use crate::turn::{TurnEnd, TurnStats};
use serde::Serialize;

use super::message::MessageRole;
use super::model::SessionStatus;

/// Payload of an event published to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum UiEventKind {
    /// The agent reported its session id and model.
    #[serde(rename_all = "camelCase")]
    Init {
        agent_session_id: Option<String>,
        model: Option<String>,
    },
    /// A finalized transcript entry.
    Message {
        role: MessageRole,
        content: String,
        interrupted: bool,
    },
    /// Incremental protocol event of the running turn.
    Stream(AgentEvent),
    /// The turn ended.
    #[serde(rename_all = "camelCase")]
    Result {
        end: TurnEnd,
        elapsed_ms: u64,
        stats: TurnStats,
    },
    Error { message: String },
    StatusChange { status: SessionStatus },
    Compacted,
    Usage(TokenUsage),
    #[serde(rename_all = "camelCase")]
    ToolProgress {
        tool_name: String,
        elapsed_seconds: f64,
    },
}

/// An event scoped to one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub kind: UiEventKind,
}

impl UiEvent {
    pub fn new(session_id: impl Into<String>, kind: UiEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
        }
    }

    /// The event name as seen by the UI.
    pub fn name(&self) -> &'static str {
        match self.kind {
            UiEventKind::Init { .. } => "init",
            UiEventKind::Message { .. } => "message",
            UiEventKind::Stream(_) => "stream",
            UiEventKind::Result { .. } => "result",
            UiEventKind::Error { .. } => "error",
            UiEventKind::StatusChange { .. } => "statusChange",
            UiEventKind::Compacted => "compacted",
            UiEventKind::Usage(_) => "usage",
            UiEventKind::ToolProgress { .. } => "toolProgress",
        }
    }
}

/// Receives UI events. Emission never blocks and never fails the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: UiEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_name_session_and_payload() {
        let event = UiEvent::new(
            "s-1",
            UiEventKind::StatusChange {
                status: SessionStatus::Streaming,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "statusChange");
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["payload"]["status"], "streaming");
        assert_eq!(event.name(), "statusChange");
    }

    #[test]
    fn unit_event_has_no_payload() {
        let json = serde_json::to_value(UiEvent::new("s", UiEventKind::Compacted)).unwrap();
        assert_eq!(json["event"], "compacted");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn stream_payload_is_the_tagged_agent_event() {
        let event = UiEvent::new(
            "s",
            UiEventKind::Stream(AgentEvent::TextDelta {
                index: 0,
                text: "hi".into(),
            }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "text_delta");
        assert_eq!(json["payload"]["text"], "hi");
    }
}
