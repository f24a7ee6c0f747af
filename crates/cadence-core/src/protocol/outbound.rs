use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Command sent to the agent's stdin as a single JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Message { content: String },
    /// Best-effort request to stop the running turn.
    Interrupt,
}

/// Content that asks the agent to compact its context.
pub const COMPACT_COMMAND: &str = "/compact";

impl OutboundMessage {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    pub fn compact() -> Self {
        Self::message(COMPACT_COMMAND)
    }

    /// Encodes the message including its trailing newline.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
