//! Session domain model.

use crate::turn::TurnState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    #[serde(alias = "running")]
    Streaming,
    Compacting,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Compacting => "compacting",
            SessionStatus::Closed => "closed",
        }
    }

    /// Parses a stored status. Unknown values read as idle.
    pub fn parse(value: &str) -> Self {
        match value {
            "streaming" | "running" => SessionStatus::Streaming,
            "compacting" => SessionStatus::Compacting,
            "closed" => SessionStatus::Closed,
            _ => SessionStatus::Idle,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TurnState> for SessionStatus {
    fn from(state: TurnState) -> Self {
        match state {
            TurnState::Idle => SessionStatus::Idle,
            TurnState::Streaming => SessionStatus::Streaming,
            TurnState::Compacting => SessionStatus::Compacting,
        }
    }
}

/// Conversation metadata as stored.
///
/// This is the "pure" domain model; the SQLite row layout lives in the
/// infrastructure crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Internal row id
    pub id: i64,
    /// Externally visible session identifier (UUID format)
    pub session_id: String,
    /// Human-readable title; unset until the first message is sent
    pub title: Option<String>,
    pub status: SessionStatus,
    pub working_directory: String,
    pub api_profile_id: Option<String>,
    pub total_cost_usd: f64,
    pub turn_count: u64,
    /// Timestamp when the session was created (RFC 3339)
    pub created_at: String,
    /// Timestamp when the session was last updated (RFC 3339)
    pub updated_at: String,
}

/// Fields supplied when a conversation is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: String,
    pub working_directory: String,
    #[serde(default)]
    pub api_profile_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}
