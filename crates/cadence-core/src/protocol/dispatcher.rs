//! Maps raw protocol records onto [`AgentEvent`]s.

use super::event::{AgentEvent, TokenUsage, TurnResult};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record as it was received, kept for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub received_at: DateTime<Utc>,
    pub record: Value,
}

/// Decodes records by their `type` field and keeps a receipt-timestamped
/// history of everything it was handed.
///
/// Unknown types and missing fields never fail: the former are logged and
/// dropped, the latter decode as defaults.
#[derive(Debug, Default)]
pub struct ProtocolDispatcher {
    history: Vec<HistoryEntry>,
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `record` in the history and decodes it.
    ///
    /// Returns zero events for unknown or ignorable records, and possibly
    /// several for an `assistant` record carrying multiple tool calls.
    pub fn dispatch(&mut self, record: Value) -> Vec<AgentEvent> {
        let events = decode(&record);
        self.history.push(HistoryEntry {
            received_at: Utc::now(),
            record,
        });
        events
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Serializes the history as JSON lines.
    pub fn export_history(&self) -> Result<String> {
        let mut out = String::new();
        for entry in &self.history {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn index_of(record: &Value) -> u64 {
    record.get("index").and_then(Value::as_u64).unwrap_or(0)
}

fn decode(record: &Value) -> Vec<AgentEvent> {
    let Some(kind) = record.get("type").and_then(Value::as_str) else {
        tracing::warn!("[Dispatcher] Record without type field dropped");
        return Vec::new();
    };

    match kind {
        // Partial-message mode wraps the API stream events in an envelope.
        "stream_event" => match record.get("event") {
            Some(inner) => decode(inner),
            None => Vec::new(),
        },
        "message_start" => {
            let message = record.get("message").unwrap_or(record);
            vec![AgentEvent::MessageStart {
                message_id: str_field(message, "id"),
                role: str_field(message, "role"),
                model: str_field(message, "model"),
            }]
        }
        "content_block_start" => {
            let content_type = record
                .get("content_block")
                .and_then(|b| b.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            vec![AgentEvent::ContentBlockStart {
                index: index_of(record),
                content_type,
            }]
        }
        "content_block_delta" => {
            let index = index_of(record);
            let delta = record.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                Some("text_delta") => {
                    let text = delta.and_then(|d| str_field(d, "text")).unwrap_or_default();
                    vec![AgentEvent::TextDelta { index, text }]
                }
                Some("input_json_delta") => vec![AgentEvent::InputJsonDelta { index }],
                other => {
                    tracing::debug!("[Dispatcher] Ignoring delta subtype {:?}", other);
                    Vec::new()
                }
            }
        }
        "content_block_stop" => vec![AgentEvent::ContentBlockStop {
            index: index_of(record),
        }],
        "message_delta" => {
            let delta = record.get("delta").unwrap_or(&Value::Null);
            vec![AgentEvent::MessageDelta {
                stop_reason: str_field(delta, "stop_reason"),
                stop_sequence: str_field(delta, "stop_sequence"),
            }]
        }
        "message_stop" => vec![AgentEvent::MessageStop {
            message: record.get("message").cloned().unwrap_or_else(|| record.clone()),
        }],
        "usage" => {
            let usage = record.get("usage").unwrap_or(record);
            vec![AgentEvent::Usage(TokenUsage::from_value(usage))]
        }
        "error" => {
            let payload = record.get("error").cloned().unwrap_or_else(|| record.clone());
            let message = match &payload {
                Value::String(s) => s.clone(),
                other => str_field(other, "message").unwrap_or_else(|| other.to_string()),
            };
            vec![AgentEvent::Error { message, payload }]
        }
        "result" => vec![AgentEvent::Result(TurnResult {
            is_error: record.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            subtype: str_field(record, "subtype"),
            text: str_field(record, "result"),
            total_cost_usd: record.get("total_cost_usd").and_then(Value::as_f64),
            num_turns: record.get("num_turns").and_then(Value::as_u64),
            duration_ms: record.get("duration_ms").and_then(Value::as_u64),
            usage: record.get("usage").map(TokenUsage::from_value),
        })],
        "system" => match record.get("subtype").and_then(Value::as_str) {
            Some("init") => vec![AgentEvent::SystemInit {
                agent_session_id: str_field(record, "session_id"),
                model: str_field(record, "model"),
            }],
            Some("compact_boundary") => vec![AgentEvent::CompactBoundary],
            other => {
                tracing::debug!("[Dispatcher] Ignoring system subtype {:?}", other);
                Vec::new()
            }
        },
        "assistant" => record
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                    .map(|b| AgentEvent::ToolUse {
                        id: str_field(b, "id"),
                        name: str_field(b, "name").unwrap_or_default(),
                        input: b.get("input").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        "tool_progress" => vec![AgentEvent::ToolProgress {
            tool_name: str_field(record, "tool_name").unwrap_or_default(),
            elapsed_seconds: record
                .get("elapsed_time_seconds")
                .or_else(|| record.get("elapsed_seconds"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        }],
        // The agent echoes user turns back; nothing to surface.
        "user" => Vec::new(),
        unknown => {
            tracing::warn!("[Dispatcher] Unknown record type '{}' dropped", unknown);
            Vec::new()
        }
    }
}
