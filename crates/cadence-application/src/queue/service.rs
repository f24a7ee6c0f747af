use cadence_core::queue::{MessageQueueRepository, MoveDirection, QueueItem};
use cadence_core::session::ConversationRepository;
use cadence_core::{CadenceError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Queue use cases.
///
/// The queue table is authoritative. After every mutation the service
/// rewrites the snapshot cached on the conversation row so the UI can restore
/// without scanning the queue table. Mutations of one session are serialized
/// through [`SessionQueue`], so a mutation and its snapshot rewrite are never
/// interleaved with another one.
pub struct QueueService {
    queue: Arc<dyn MessageQueueRepository>,
    conversations: Arc<dyn ConversationRepository>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl QueueService {
    pub fn new(
        queue: Arc<dyn MessageQueueRepository>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self {
            queue,
            conversations,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Takes exclusive hold of one session's queue until the guard drops.
    ///
    /// Used directly when a read and the mutation that depends on it must not
    /// be split, as in auto-dispatch.
    pub async fn lock(&self, session_id: &str) -> SessionQueue<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(session_id.to_string()).or_default().clone()
        };
        SessionQueue {
            service: self,
            session_id: session_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    pub async fn enqueue(&self, session_id: &str, content: &str) -> Result<QueueItem> {
        self.lock(session_id).await.enqueue(content).await
    }

    pub async fn list(&self, session_id: &str) -> Result<Vec<QueueItem>> {
        self.queue.list(session_id).await
    }

    pub async fn find(&self, session_id: &str, id: &str) -> Result<Option<QueueItem>> {
        self.queue.find(session_id, id).await
    }

    pub async fn update(&self, session_id: &str, id: &str, content: &str) -> Result<usize> {
        self.lock(session_id).await.update(id, content).await
    }

    pub async fn delete(&self, session_id: &str, id: &str) -> Result<usize> {
        self.lock(session_id).await.delete(id).await
    }

    pub async fn swap_order(&self, session_id: &str, first_id: &str, second_id: &str) -> Result<()> {
        self.lock(session_id).await.swap_order(first_id, second_id).await
    }

    /// Moves an item one position by swapping with its neighbour.
    ///
    /// Returns `false` when the item is already at that end of the queue.
    pub async fn move_item(
        &self,
        session_id: &str,
        id: &str,
        direction: MoveDirection,
    ) -> Result<bool> {
        let queue = self.lock(session_id).await;
        let items = queue.list().await?;
        let position = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| CadenceError::not_found("QueueItem", id))?;

        let neighbour = match direction {
            MoveDirection::Up if position > 0 => &items[position - 1],
            MoveDirection::Down if position + 1 < items.len() => &items[position + 1],
            _ => return Ok(false),
        };

        queue.swap_order(id, &neighbour.id).await?;
        Ok(true)
    }

    /// Logical clear: items are marked executed, not removed.
    pub async fn clear(&self, session_id: &str) -> Result<usize> {
        self.lock(session_id).await.clear().await
    }

    pub async fn mark_executed(&self, session_id: &str, id: &str) -> Result<usize> {
        self.lock(session_id).await.mark_executed(id).await
    }

    pub async fn persist_snapshot(&self, session_id: &str, items: &[QueueItem]) -> Result<()> {
        self.conversations.save_queue_snapshot(session_id, items).await
    }

    pub async fn load_snapshot(&self, session_id: &str) -> Result<Vec<QueueItem>> {
        self.conversations.load_queue_snapshot(session_id).await
    }

    /// Reads the authoritative queue and repairs the snapshot if it drifted.
    pub async fn restore(&self, session_id: &str) -> Result<Vec<QueueItem>> {
        let _queue = self.lock(session_id).await;
        let items = self.queue.list(session_id).await?;
        let snapshot = self.load_snapshot(session_id).await?;

        if snapshot != items {
            tracing::warn!(
                "[Queue] {} snapshot drifted ({} cached, {} pending); rewriting",
                session_id,
                snapshot.len(),
                items.len()
            );
            self.persist_snapshot(session_id, &items).await?;
        }
        Ok(items)
    }

    /// The queue mutation already committed, so a failed snapshot write is
    /// only logged; `restore` repairs it later.
    async fn refresh_snapshot(&self, session_id: &str) {
        let result = match self.queue.list(session_id).await {
            Ok(items) => self.persist_snapshot(session_id, &items).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("[Queue] {} has no conversation row for a snapshot", session_id);
            }
            Err(e) => {
                tracing::error!("[Queue] {} snapshot refresh failed: {}", session_id, e);
            }
        }
    }
}

/// One session's queue, held exclusively.
///
/// Every mutation rewrites the snapshot before returning.
pub struct SessionQueue<'a> {
    service: &'a QueueService,
    session_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SessionQueue<'_> {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn list(&self) -> Result<Vec<QueueItem>> {
        self.service.queue.list(&self.session_id).await
    }

    pub async fn enqueue(&self, content: &str) -> Result<QueueItem> {
        let item = self.service.queue.enqueue(&self.session_id, content).await?;
        tracing::info!("[Queue] {} queued {}", self.session_id, item.id);
        self.service.refresh_snapshot(&self.session_id).await;
        Ok(item)
    }

    pub async fn update(&self, id: &str, content: &str) -> Result<usize> {
        let affected = self.service.queue.update(&self.session_id, id, content).await?;
        if affected > 0 {
            self.service.refresh_snapshot(&self.session_id).await;
        }
        Ok(affected)
    }

    pub async fn delete(&self, id: &str) -> Result<usize> {
        let affected = self.service.queue.delete(&self.session_id, id).await?;
        if affected > 0 {
            self.service.refresh_snapshot(&self.session_id).await;
        }
        Ok(affected)
    }

    pub async fn swap_order(&self, first_id: &str, second_id: &str) -> Result<()> {
        self.service
            .queue
            .swap_order(&self.session_id, first_id, second_id)
            .await?;
        self.service.refresh_snapshot(&self.session_id).await;
        Ok(())
    }

    pub async fn clear(&self) -> Result<usize> {
        let affected = self.service.queue.clear(&self.session_id).await?;
        self.service.refresh_snapshot(&self.session_id).await;
        Ok(affected)
    }

    pub async fn mark_executed(&self, id: &str) -> Result<usize> {
        let affected = self.service.queue.mark_executed(&self.session_id, id).await?;
        if affected > 0 {
            self.service.refresh_snapshot(&self.session_id).await;
        }
        Ok(affected)
    }
}
