//! Auto-dispatch policy.

use super::QueueService;
use async_trait::async_trait;
use cadence_core::queue::QueueItem;
use cadence_core::turn::TurnEnd;
use cadence_core::{CadenceError, Result};
use std::sync::Arc;

/// Something that can start a turn with the given content.
///
/// Implemented by the session while it holds its own lock, so a dispatch
/// decision and the turn it starts are never interleaved with another event
/// of the same session.
#[async_trait]
pub trait TurnStarter: Send {
    async fn start_turn(&mut self, content: &str) -> Result<()>;
}

/// Outcome of one post-turn decision.
#[derive(Debug, Clone)]
pub enum AutoDispatch {
    /// The turn did not end naturally (interrupt, error, compaction).
    Suppressed,
    /// Auto-dispatch is switched off in config.
    Disabled,
    Empty,
    /// The head item was sent and removed from the queue.
    Dispatched(QueueItem),
    /// Starting the turn failed; the item is still at the front.
    Rejected { item: QueueItem, error: CadenceError },
}

/// Decides, once per turn end, whether the next queued message goes out.
pub struct QueueCoordinator {
    queue: Arc<QueueService>,
    auto_dispatch: bool,
}

impl QueueCoordinator {
    pub fn new(queue: Arc<QueueService>, auto_dispatch: bool) -> Self {
        Self {
            queue,
            auto_dispatch,
        }
    }

    pub fn auto_dispatch_enabled(&self) -> bool {
        self.auto_dispatch
    }

    /// Runs the policy for a turn that just ended.
    ///
    /// The head item is deleted only after `starter` accepted it, so a
    /// rejected send leaves the queue exactly as it was. The session's queue
    /// stays locked for the whole decision.
    pub async fn after_turn(
        &self,
        session_id: &str,
        end: &TurnEnd,
        starter: &mut dyn TurnStarter,
    ) -> Result<AutoDispatch> {
        if !end.is_natural_completion() {
            tracing::debug!("[Queue] {} auto-dispatch suppressed after {:?}", session_id, end);
            return Ok(AutoDispatch::Suppressed);
        }
        if !self.auto_dispatch {
            return Ok(AutoDispatch::Disabled);
        }

        // Held until the head is consumed so edits from the UI cannot land
        // between reading the head and removing it.
        let queue = self.queue.lock(session_id).await;
        let Some(head) = queue.list().await?.into_iter().next() else {
            return Ok(AutoDispatch::Empty);
        };

        if let Err(error) = starter.start_turn(&head.content).await {
            tracing::warn!(
                "[Queue] {} could not dispatch {}: {}; keeping it queued",
                session_id,
                head.id,
                error
            );
            return Ok(AutoDispatch::Rejected { item: head, error });
        }

        if let Err(e) = queue.delete(&head.id).await {
            // The message went out; leaving the row would send it twice.
            tracing::error!(
                "[Queue] {} dispatched {} but could not remove it: {}",
                session_id,
                head.id,
                e
            );
            return Err(e);
        }

        tracing::info!("[Queue] {} auto-dispatched {}", session_id, head.id);
        Ok(AutoDispatch::Dispatched(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::session::{ConversationRepository, NewSession};
    use cadence_infrastructure::SqliteStore;

    #[derive(Default)]
    struct RecordingStarter {
        started: Vec<String>,
        reject: bool,
    }

    #[async_trait]
    impl TurnStarter for RecordingStarter {
        async fn start_turn(&mut self, content: &str) -> Result<()> {
            if self.reject {
                return Err(CadenceError::busy("s", "streaming"));
            }
            self.started.push(content.to_string());
            Ok(())
        }
    }

    fn coordinator(auto_dispatch: bool) -> (QueueCoordinator, Arc<QueueService>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let queue = Arc::new(QueueService::new(store.clone(), store));
        (QueueCoordinator::new(queue.clone(), auto_dispatch), queue)
    }

    #[tokio::test]
    async fn natural_completion_dispatches_head() {
        let (coordinator, queue) = coordinator(true);
        queue.enqueue("s", "first").await.unwrap();
        queue.enqueue("s", "second").await.unwrap();
        let mut starter = RecordingStarter::default();

        let outcome = coordinator
            .after_turn("s", &TurnEnd::Completed, &mut starter)
            .await
            .unwrap();

        assert!(matches!(outcome, AutoDispatch::Dispatched(ref item) if item.content == "first"));
        assert_eq!(starter.started, vec!["first"]);
        let remaining = queue.list("s").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "second");
    }

    #[tokio::test]
    async fn interrupt_and_failure_never_dispatch() {
        let (coordinator, queue) = coordinator(true);
        queue.enqueue("s", "waiting").await.unwrap();
        let mut starter = RecordingStarter::default();

        for end in [
            TurnEnd::Interrupted,
            TurnEnd::Failed("boom".into()),
            TurnEnd::Compacted,
        ] {
            let outcome = coordinator.after_turn("s", &end, &mut starter).await.unwrap();
            assert!(matches!(outcome, AutoDispatch::Suppressed));
        }
        assert!(starter.started.is_empty());
        assert_eq!(queue.list("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_start_keeps_item_at_front() {
        let (coordinator, queue) = coordinator(true);
        let head = queue.enqueue("s", "head").await.unwrap();
        queue.enqueue("s", "tail").await.unwrap();
        let mut starter = RecordingStarter {
            reject: true,
            ..Default::default()
        };

        let outcome = coordinator
            .after_turn("s", &TurnEnd::Completed, &mut starter)
            .await
            .unwrap();

        assert!(matches!(outcome, AutoDispatch::Rejected { ref item, ref error }
            if item.id == head.id && error.is_busy()));
        let items = queue.list("s").await.unwrap();
        assert_eq!(items[0].id, head.id);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn empty_and_disabled() {
        let (enabled, _) = coordinator(true);
        let mut starter = RecordingStarter::default();
        assert!(matches!(
            enabled.after_turn("s", &TurnEnd::Completed, &mut starter).await.unwrap(),
            AutoDispatch::Empty
        ));

        let (disabled, queue) = coordinator(false);
        queue.enqueue("s", "manual only").await.unwrap();
        assert!(matches!(
            disabled.after_turn("s", &TurnEnd::Completed, &mut starter).await.unwrap(),
            AutoDispatch::Disabled
        ));
        assert_eq!(queue.list("s").await.unwrap().len(), 1);
    }

    /// Edits the queue from another task while the turn is being started.
    struct RacingStarter {
        queue: Arc<QueueService>,
        head_id: String,
        edits: Option<tokio::task::JoinHandle<(usize, QueueItem)>>,
    }

    #[async_trait]
    impl TurnStarter for RacingStarter {
        async fn start_turn(&mut self, _content: &str) -> Result<()> {
            let queue = self.queue.clone();
            let head_id = self.head_id.clone();
            self.edits = Some(tokio::spawn(async move {
                let updated = queue.update("s", &head_id, "edited too late").await.unwrap();
                let added = queue.enqueue("s", "C").await.unwrap();
                (updated, added)
            }));
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_edits_wait_for_dispatch_and_snapshot_stays_in_sync() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .create(&NewSession {
                session_id: "s".to_string(),
                working_directory: "/tmp".to_string(),
                api_profile_id: None,
                title: None,
            })
            .await
            .unwrap();
        let queue = Arc::new(QueueService::new(store.clone(), store.clone()));
        let coordinator = QueueCoordinator::new(queue.clone(), true);
        let head = queue.enqueue("s", "A").await.unwrap();
        queue.enqueue("s", "B").await.unwrap();

        let mut starter = RacingStarter {
            queue: queue.clone(),
            head_id: head.id.clone(),
            edits: None,
        };
        let outcome = coordinator
            .after_turn("s", &TurnEnd::Completed, &mut starter)
            .await
            .unwrap();
        assert!(matches!(outcome, AutoDispatch::Dispatched(ref item) if item.content == "A"));

        // The edit ran after the head was consumed, so it found nothing.
        let (updated, _) = starter.edits.take().unwrap().await.unwrap();
        assert_eq!(updated, 0);

        let pending = queue.list("s").await.unwrap();
        let contents: Vec<_> = pending.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["B", "C"]);
        assert_eq!(store.load_queue_snapshot("s").await.unwrap(), pending);
    }
}
