//! Turn lifecycle: state, transitions and accounting.

pub mod machine;

pub use machine::{Disposition, TurnStateMachine};

use crate::protocol::TokenUsage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// In-memory state of a session's current turn. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
    Compacting,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::Streaming => "streaming",
            TurnState::Compacting => "compacting",
        };
        f.write_str(s)
    }
}

/// How a turn reached Idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TurnEnd {
    /// `result` record, or `message_stop` after a final stop reason.
    Completed,
    /// The user cancelled the turn.
    Interrupted,
    /// The agent reported an error.
    Failed(String),
    /// Compaction finished.
    Compacted,
}

impl TurnEnd {
    /// Only natural completion may trigger auto-dispatch.
    pub fn is_natural_completion(&self) -> bool {
        matches!(self, TurnEnd::Completed)
    }
}

/// Assistant text flushed when a turn ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedMessage {
    pub content: String,
    pub interrupted: bool,
}

/// A Streaming/Compacting to Idle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTransition {
    pub generation: u64,
    pub end: TurnEnd,
    pub finalized: Option<FinalizedMessage>,
    pub elapsed_ms: u64,
}

/// Cumulative per-session counters. Only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnStats {
    pub total_cost_usd: f64,
    pub turn_count: u64,
    pub usage: TokenUsage,
    pub last_elapsed_ms: Option<u64>,
}
