//! Pending user messages.
//!
//! Items are ordered by `created_at` (epoch milliseconds) with `id` as the
//! tie-break. There is no separate rank column: reordering swaps the
//! timestamps of two items.

use crate::error::{CadenceError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A message waiting for the current turn to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub session_id: String,
    pub content: String,
    #[serde(default)]
    pub executed: bool,
    /// Sort key, epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub executed_at: Option<i64>,
}

impl QueueItem {
    /// Queue order: timestamp, then id.
    pub fn queue_order(a: &QueueItem, b: &QueueItem) -> Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Rejects content that is empty after trimming.
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CadenceError::invalid_input("queued message must not be empty"));
    }
    Ok(())
}

/// Direction for a single-step move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Durable per-session FIFO of pending messages.
///
/// Every method is scoped to the externally visible session id. Multi-row
/// mutations are atomic.
#[async_trait]
pub trait MessageQueueRepository: Send + Sync {
    /// Appends a message with a timestamp later than now and than the current tail.
    async fn enqueue(&self, session_id: &str, content: &str) -> Result<QueueItem>;

    /// Non-executed items in queue order.
    async fn list(&self, session_id: &str) -> Result<Vec<QueueItem>>;

    async fn find(&self, session_id: &str, id: &str) -> Result<Option<QueueItem>>;

    /// Replaces the content of a pending item. Returns rows affected (0 if absent).
    async fn update(&self, session_id: &str, id: &str, content: &str) -> Result<usize>;

    /// Removes the row. Idempotent; returns rows affected.
    async fn delete(&self, session_id: &str, id: &str) -> Result<usize>;

    /// Exchanges two items' timestamps, both or neither.
    async fn swap_order(&self, session_id: &str, first_id: &str, second_id: &str) -> Result<()>;

    /// Marks every pending item executed. Returns how many were pending.
    async fn clear(&self, session_id: &str) -> Result<usize>;

    /// Marks one item executed. Returns rows affected.
    async fn mark_executed(&self, session_id: &str, id: &str) -> Result<usize>;
}
