use super::{SqlContext, SqliteStore};
use async_trait::async_trait;
use cadence_core::queue::{MessageQueueRepository, QueueItem, validate_content};
use cadence_core::{CadenceError, Result};
use rusqlite::{OptionalExtension, Row, params};

const SELECT_COLUMNS: &str =
    "SELECT id, session_uuid, content, is_executed, created_at, executed_at FROM session_message_queue";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        executed: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        executed_at: row.get(5)?,
    })
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl MessageQueueRepository for SqliteStore {
    async fn enqueue(&self, session_id: &str, content: &str) -> Result<QueueItem> {
        validate_content(content)?;
        let session_id = session_id.to_string();
        let content = content.to_string();

        self.run_blocking(move |conn| {
            let tx = conn.transaction().db()?;
            // Strictly later than now and than the current tail, so FIFO order
            // holds even when the clock stalls or several enqueues share a tick.
            let tail: Option<i64> = tx
                .query_row(
                    "SELECT MAX(created_at) FROM session_message_queue
                     WHERE session_uuid = ?1 AND is_executed = 0",
                    params![session_id],
                    |row| row.get(0),
                )
                .db()?;
            let created_at = match tail {
                Some(tail) => (now_ms() + 1).max(tail + 1),
                None => now_ms() + 1,
            };

            let item = QueueItem {
                id: uuid::Uuid::new_v4().to_string(),
                session_id,
                content,
                executed: false,
                created_at,
                executed_at: None,
            };
            tx.execute(
                "INSERT INTO session_message_queue (id, session_uuid, content, is_executed, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![item.id, item.session_id, item.content, item.created_at],
            )
            .db()?;
            tx.commit().db()?;

            tracing::debug!("[Queue] Enqueued {} for session {}", item.id, item.session_id);
            Ok(item)
        })
        .await
    }

    async fn list(&self, session_id: &str) -> Result<Vec<QueueItem>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_COLUMNS} WHERE session_uuid = ?1 AND is_executed = 0
                     ORDER BY created_at ASC, id ASC"
                ))
                .db()?;
            let items = stmt
                .query_map(params![session_id], row_to_item)
                .db()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .db()?;
            Ok(items)
        })
        .await
    }

    async fn find(&self, session_id: &str, id: &str) -> Result<Option<QueueItem>> {
        let session_id = session_id.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE session_uuid = ?1 AND id = ?2"),
                params![session_id, id],
                row_to_item,
            )
            .optional()
            .db()
        })
        .await
    }

    async fn update(&self, session_id: &str, id: &str, content: &str) -> Result<usize> {
        validate_content(content)?;
        let session_id = session_id.to_string();
        let id = id.to_string();
        let content = content.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE session_message_queue SET content = ?1
                 WHERE session_uuid = ?2 AND id = ?3 AND is_executed = 0",
                params![content, session_id, id],
            )
            .db()
        })
        .await
    }

    async fn delete(&self, session_id: &str, id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "DELETE FROM session_message_queue WHERE session_uuid = ?1 AND id = ?2",
                params![session_id, id],
            )
            .db()
        })
        .await
    }

    async fn swap_order(&self, session_id: &str, first_id: &str, second_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let first_id = first_id.to_string();
        let second_id = second_id.to_string();

        self.run_blocking(move |conn| {
            let tx = conn.transaction().db()?;
            let created_at = |id: &str| -> Result<i64> {
                tx.query_row(
                    "SELECT created_at FROM session_message_queue
                     WHERE session_uuid = ?1 AND id = ?2 AND is_executed = 0",
                    params![session_id, id],
                    |row| row.get(0),
                )
                .optional()
                .db()?
                .ok_or_else(|| CadenceError::not_found("QueueItem", id))
            };
            let first_at = created_at(&first_id)?;
            let second_at = created_at(&second_id)?;
            if first_id == second_id {
                return Ok(());
            }

            let mut stmt = tx
                .prepare("UPDATE session_message_queue SET created_at = ?1 WHERE id = ?2")
                .db()?;
            stmt.execute(params![second_at, first_id]).db()?;
            stmt.execute(params![first_at, second_id]).db()?;
            drop(stmt);
            tx.commit().db()?;

            tracing::debug!("[Queue] Swapped {} <-> {}", first_id, second_id);
            Ok(())
        })
        .await
    }

    async fn clear(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE session_message_queue SET is_executed = 1, executed_at = ?1
                     WHERE session_uuid = ?2 AND is_executed = 0",
                    params![now_ms(), session_id],
                )
                .db()?;
            tracing::debug!("[Queue] Cleared {} item(s) for session {}", affected, session_id);
            Ok(affected)
        })
        .await
    }

    async fn mark_executed(&self, session_id: &str, id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE session_message_queue SET is_executed = 1, executed_at = ?1
                 WHERE session_uuid = ?2 AND id = ?3 AND is_executed = 0",
                params![now_ms(), session_id, id],
            )
            .db()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(items: &[QueueItem]) -> Vec<&str> {
        items.iter().map(|i| i.content.as_str()).collect()
    }

    #[tokio::test]
    async fn list_returns_enqueue_order() {
        let store = SqliteStore::in_memory().unwrap();
        for content in ["one", "two", "three", "four"] {
            store.enqueue("s1", content).await.unwrap();
        }

        let items = store.list("s1").await.unwrap();
        assert_eq!(contents(&items), vec!["one", "two", "three", "four"]);
        assert!(items.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn fifo_order_survives_updates_and_deletes_of_other_items() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();
        let b = store.enqueue("s1", "b").await.unwrap();
        store.enqueue("s1", "c").await.unwrap();

        assert_eq!(store.update("s1", &a.id, "a2").await.unwrap(), 1);
        assert_eq!(store.delete("s1", &b.id).await.unwrap(), 1);
        store.enqueue("s1", "d").await.unwrap();

        let items = store.list("s1").await.unwrap();
        assert_eq!(contents(&items), vec!["a2", "c", "d"]);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SqliteStore::in_memory().unwrap();
        let item = store.enqueue("s1", "mine").await.unwrap();
        store.enqueue("s2", "theirs").await.unwrap();

        assert_eq!(contents(&store.list("s1").await.unwrap()), vec!["mine"]);
        assert_eq!(store.update("s2", &item.id, "stolen").await.unwrap(), 0);
        assert_eq!(store.delete("s2", &item.id).await.unwrap(), 0);
        assert!(store.find("s2", &item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.enqueue("s1", "   ").await.unwrap_err().is_invalid_input());

        let item = store.enqueue("s1", "ok").await.unwrap();
        assert!(store.update("s1", &item.id, "\n").await.unwrap_err().is_invalid_input());
        assert_eq!(store.find("s1", &item.id).await.unwrap().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_ids_affect_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.update("s1", "missing", "x").await.unwrap(), 0);
        assert_eq!(store.delete("s1", "missing").await.unwrap(), 0);

        let item = store.enqueue("s1", "x").await.unwrap();
        assert_eq!(store.delete("s1", &item.id).await.unwrap(), 1);
        assert_eq!(store.delete("s1", &item.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn swap_twice_restores_order() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();
        store.enqueue("s1", "b").await.unwrap();
        let c = store.enqueue("s1", "c").await.unwrap();

        store.swap_order("s1", &a.id, &c.id).await.unwrap();
        assert_eq!(contents(&store.list("s1").await.unwrap()), vec!["c", "b", "a"]);

        store.swap_order("s1", &a.id, &c.id).await.unwrap();
        assert_eq!(contents(&store.list("s1").await.unwrap()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn swap_with_missing_item_changes_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();
        let b = store.enqueue("s1", "b").await.unwrap();

        let err = store.swap_order("s1", &a.id, "missing").await.unwrap_err();
        assert!(err.is_not_found());

        let items = store.list("s1").await.unwrap();
        assert_eq!(items[0].id, a.id);
        assert_eq!(items[0].created_at, a.created_at);
        assert_eq!(items[1].created_at, b.created_at);
    }

    #[tokio::test]
    async fn swapping_an_item_with_itself_still_checks_it_exists() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();

        store.swap_order("s1", &a.id, &a.id).await.unwrap();
        assert_eq!(store.list("s1").await.unwrap()[0].created_at, a.created_at);

        let err = store.swap_order("s1", "ghost", "ghost").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.swap_order("other", &a.id, &a.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn clear_marks_items_executed() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();
        store.enqueue("s1", "b").await.unwrap();

        assert_eq!(store.clear("s1").await.unwrap(), 2);
        assert!(store.list("s1").await.unwrap().is_empty());

        let kept = store.find("s1", &a.id).await.unwrap().unwrap();
        assert!(kept.executed);
        assert!(kept.executed_at.is_some());
    }

    #[tokio::test]
    async fn clear_on_empty_queue_is_zero() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.clear("s1").await.unwrap(), 0);
        assert_eq!(store.clear("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_executed_removes_single_item_from_list() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue("s1", "a").await.unwrap();
        store.enqueue("s1", "b").await.unwrap();

        assert_eq!(store.mark_executed("s1", &a.id).await.unwrap(), 1);
        assert_eq!(store.mark_executed("s1", &a.id).await.unwrap(), 0);
        assert_eq!(contents(&store.list("s1").await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn timestamp_collision_orders_by_id() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .run_blocking(|conn| {
                conn.execute_batch(
                    "INSERT INTO session_message_queue (id, session_uuid, content, created_at)
                     VALUES ('b', 's1', 'second', 100), ('a', 's1', 'first', 100);",
                )
                .db()
            })
            .await
            .unwrap();

        assert_eq!(contents(&store.list("s1").await.unwrap()), vec!["first", "second"]);
    }
}
