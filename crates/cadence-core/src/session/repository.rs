//! Conversation repository trait.
//!
//! Defines the interface for conversation persistence operations.

use super::message::{ConversationMessage, MessageRole};
use super::model::{NewSession, Session, SessionStatus};
use crate::error::Result;
use crate::queue::QueueItem;
use async_trait::async_trait;

/// An abstract repository for conversation metadata, transcripts and the
/// denormalized queue snapshot.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - Bumping `updated_at` on every metadata write
/// - Removing transcript and queue rows together with the conversation on
///   hard delete, atomically
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Creates a conversation row with status idle.
    async fn create(&self, new_session: &NewSession) -> Result<Session>;

    /// Finds a conversation by its session id.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Conversation found
    /// - `Ok(None)`: Conversation not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Lists all conversations, most recently updated first.
    async fn list_all(&self) -> Result<Vec<Session>>;

    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;

    async fn update_title(&self, session_id: &str, title: &str) -> Result<()>;

    /// Stores the cumulative cost and turn count.
    async fn record_turn_accounting(
        &self,
        session_id: &str,
        total_cost_usd: f64,
        turn_count: u64,
    ) -> Result<()>;

    /// Soft close: status becomes closed, rows are kept.
    async fn close(&self, session_id: &str) -> Result<()>;

    /// Hard delete of the conversation, its messages and its queue rows.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Conversation deleted
    /// - `Ok(false)`: Conversation did not exist
    async fn delete(&self, session_id: &str) -> Result<bool>;

    async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        interrupted: bool,
    ) -> Result<ConversationMessage>;

    /// Transcript in insertion order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>>;

    /// Overwrites the cached queue snapshot.
    async fn save_queue_snapshot(&self, session_id: &str, items: &[QueueItem]) -> Result<()>;

    /// Reads the cached queue snapshot; empty if never written.
    async fn load_queue_snapshot(&self, session_id: &str) -> Result<Vec<QueueItem>>;
}
