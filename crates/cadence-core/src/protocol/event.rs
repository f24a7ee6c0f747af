use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn from_value(value: &Value) -> Self {
        Self {
            input_tokens: value.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: value.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Summary carried by a `result` record at the end of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub is_error: bool,
    pub subtype: Option<String>,
    pub text: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub num_turns: Option<u64>,
    pub duration_ms: Option<u64>,
    pub usage: Option<TokenUsage>,
}

/// A typed event decoded from one inbound protocol record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    MessageStart {
        message_id: Option<String>,
        role: Option<String>,
        model: Option<String>,
    },
    ContentBlockStart {
        index: u64,
        content_type: String,
    },
    TextDelta {
        index: u64,
        text: String,
    },
    /// Tool input streaming in. Recognised, but carries no display text.
    InputJsonDelta {
        index: u64,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        stop_reason: Option<String>,
        stop_sequence: Option<String>,
    },
    MessageStop {
        message: Value,
    },
    Usage(TokenUsage),
    Error {
        message: String,
        payload: Value,
    },
    Result(TurnResult),
    SystemInit {
        agent_session_id: Option<String>,
        model: Option<String>,
    },
    CompactBoundary,
    ToolUse {
        id: Option<String>,
        name: String,
        input: Value,
    },
    ToolProgress {
        tool_name: String,
        elapsed_seconds: f64,
    },
}

impl AgentEvent {
    /// Records that may still follow a turn's final message.
    pub fn is_trailing(&self) -> bool {
        matches!(
            self,
            AgentEvent::Result(_) | AgentEvent::Error { .. } | AgentEvent::Usage(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::MessageStart { .. } => "message_start",
            AgentEvent::ContentBlockStart { .. } => "content_block_start",
            AgentEvent::TextDelta { .. } => "text_delta",
            AgentEvent::InputJsonDelta { .. } => "input_json_delta",
            AgentEvent::ContentBlockStop { .. } => "content_block_stop",
            AgentEvent::MessageDelta { .. } => "message_delta",
            AgentEvent::MessageStop { .. } => "message_stop",
            AgentEvent::Usage(_) => "usage",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Result(_) => "result",
            AgentEvent::SystemInit { .. } => "system_init",
            AgentEvent::CompactBoundary => "compact_boundary",
            AgentEvent::ToolUse { .. } => "tool_use",
            AgentEvent::ToolProgress { .. } => "tool_progress",
        }
    }
}
