use super::{SqlContext, SqliteStore, now_rfc3339};
use crate::dto::QueueSnapshotDTO;
use async_trait::async_trait;
use cadence_core::queue::QueueItem;
use cadence_core::session::{
    ConversationMessage, ConversationRepository, MessageRole, NewSession, Session, SessionStatus,
};
use cadence_core::{CadenceError, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const SELECT_CONVERSATION: &str = "SELECT id, session_uuid, title, status, working_directory,
    api_profile_id, total_cost_usd, turn_count, created_at, updated_at FROM conversations";

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(3)?;
    let turn_count: i64 = row.get(7)?;
    Ok(Session {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        status: SessionStatus::parse(&status),
        working_directory: row.get(4)?,
        api_profile_id: row.get(5)?,
        total_cost_usd: row.get(6)?,
        turn_count: turn_count.max(0) as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn find_session(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    conn.query_row(
        &format!("{SELECT_CONVERSATION} WHERE session_uuid = ?1"),
        params![session_id],
        row_to_session,
    )
    .optional()
    .db()
}

fn conversation_row_id(conn: &Connection, session_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM conversations WHERE session_uuid = ?1",
        params![session_id],
        |row| row.get(0),
    )
    .optional()
    .db()?
    .ok_or_else(|| CadenceError::not_found("Session", session_id))
}

fn require_affected(affected: usize, session_id: &str) -> Result<()> {
    if affected == 0 {
        return Err(CadenceError::not_found("Session", session_id));
    }
    Ok(())
}

#[async_trait]
impl ConversationRepository for SqliteStore {
    async fn create(&self, new_session: &NewSession) -> Result<Session> {
        let new_session = new_session.clone();
        self.run_blocking(move |conn| {
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO conversations
                 (session_uuid, title, status, working_directory, api_profile_id, created_at, updated_at)
                 VALUES (?1, ?2, 'idle', ?3, ?4, ?5, ?5)",
                params![
                    new_session.session_id,
                    new_session.title,
                    new_session.working_directory,
                    new_session.api_profile_id,
                    now
                ],
            )
            .db()?;
            tracing::info!("[Storage] Created conversation {}", new_session.session_id);
            find_session(conn, &new_session.session_id)?
                .ok_or_else(|| CadenceError::internal("conversation vanished after insert"))
        })
        .await
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| find_session(conn, &session_id))
            .await
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        self.run_blocking(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_CONVERSATION} ORDER BY updated_at DESC, id DESC"
                ))
                .db()?;
            let sessions = stmt
                .query_map([], row_to_session)
                .db()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .db()?;
            Ok(sessions)
        })
        .await
    }

    async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE session_uuid = ?3",
                    params![status.as_str(), now_rfc3339(), session_id],
                )
                .db()?;
            require_affected(affected, &session_id)
        })
        .await
    }

    async fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let title = title.to_string();
        self.run_blocking(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE session_uuid = ?3",
                    params![title, now_rfc3339(), session_id],
                )
                .db()?;
            require_affected(affected, &session_id)
        })
        .await
    }

    async fn record_turn_accounting(
        &self,
        session_id: &str,
        total_cost_usd: f64,
        turn_count: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE conversations SET total_cost_usd = ?1, turn_count = ?2, updated_at = ?3
                     WHERE session_uuid = ?4",
                    params![total_cost_usd, turn_count as i64, now_rfc3339(), session_id],
                )
                .db()?;
            require_affected(affected, &session_id)
        })
        .await
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        self.update_status(session_id, SessionStatus::Closed).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let tx = conn.transaction().db()?;
            tx.execute(
                "DELETE FROM session_message_queue WHERE session_uuid = ?1",
                params![session_id],
            )
            .db()?;
            // Transcript rows go with the conversation via ON DELETE CASCADE.
            let deleted = tx
                .execute(
                    "DELETE FROM conversations WHERE session_uuid = ?1",
                    params![session_id],
                )
                .db()?;
            tx.commit().db()?;
            tracing::info!("[Storage] Deleted conversation {}", session_id);
            Ok(deleted > 0)
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        interrupted: bool,
    ) -> Result<ConversationMessage> {
        let session_id = session_id.to_string();
        let content = content.to_string();
        self.run_blocking(move |conn| {
            let tx = conn.transaction().db()?;
            let conversation_id = conversation_row_id(&tx, &session_id)?;
            let now = now_rfc3339();
            tx.execute(
                "INSERT INTO conversation_messages (conversation_id, role, content, interrupted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, role.as_str(), content, interrupted, now],
            )
            .db()?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )
            .db()?;
            tx.commit().db()?;

            Ok(ConversationMessage {
                id,
                session_id,
                role,
                content,
                interrupted,
                created_at: now,
            })
        })
        .await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT m.id, m.role, m.content, m.interrupted, m.created_at
                     FROM conversation_messages m
                     JOIN conversations c ON c.id = m.conversation_id
                     WHERE c.session_uuid = ?1
                     ORDER BY m.id ASC",
                )
                .db()?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .db()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .db()?;

            rows.into_iter()
                .map(|(id, role, content, interrupted, created_at)| {
                    let role = MessageRole::parse(&role).ok_or_else(|| {
                        CadenceError::data_access(format!("unknown message role '{}'", role))
                    })?;
                    Ok(ConversationMessage {
                        id,
                        session_id: session_id.clone(),
                        role,
                        content,
                        interrupted,
                        created_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn save_queue_snapshot(&self, session_id: &str, items: &[QueueItem]) -> Result<()> {
        let session_id = session_id.to_string();
        let json = serde_json::to_string(&QueueSnapshotDTO::from_items(items))?;
        self.run_blocking(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE conversations SET queued_messages = ?1 WHERE session_uuid = ?2",
                    params![json, session_id],
                )
                .db()?;
            require_affected(affected, &session_id)
        })
        .await
    }

    async fn load_queue_snapshot(&self, session_id: &str) -> Result<Vec<QueueItem>> {
        let session_id = session_id.to_string();
        let raw: String = {
            let session_id = session_id.clone();
            self.run_blocking(move |conn| {
                conn.query_row(
                    "SELECT queued_messages FROM conversations WHERE session_uuid = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()
                .db()?
                .ok_or_else(|| CadenceError::not_found("Session", session_id))
            })
            .await?
        };

        // The snapshot is a cache; a corrupt one reads as empty.
        match serde_json::from_str::<QueueSnapshotDTO>(&raw) {
            Ok(snapshot) => Ok(snapshot.into_items(&session_id)),
            Err(e) => {
                tracing::warn!(
                    "[Storage] Ignoring unreadable queue snapshot for {}: {}",
                    session_id,
                    e
                );
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::queue::MessageQueueRepository;

    fn new_session(id: &str) -> NewSession {
        NewSession {
            session_id: id.to_string(),
            working_directory: "/tmp/project".to_string(),
            api_profile_id: None,
            title: None,
        }
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create(&new_session("s1")).await.unwrap();
        assert_eq!(created.session_id, "s1");
        assert_eq!(created.status, SessionStatus::Idle);
        assert_eq!(created.turn_count, 0);

        let found = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_session_id_is_a_data_access_error() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        assert!(store.create(&new_session("s1")).await.unwrap_err().is_data_access());
    }

    #[tokio::test]
    async fn list_all_is_most_recently_updated_first() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("old")).await.unwrap();
        store.create(&new_session("new")).await.unwrap();
        store.update_title("old", "touched").await.unwrap();

        let ids: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn status_title_and_accounting_updates() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();

        store.update_status("s1", SessionStatus::Streaming).await.unwrap();
        store.update_title("s1", "Fix the build").await.unwrap();
        store.record_turn_accounting("s1", 1.25, 3).await.unwrap();

        let session = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Streaming);
        assert_eq!(session.title.as_deref(), Some("Fix the build"));
        assert_eq!(session.total_cost_usd, 1.25);
        assert_eq!(session.turn_count, 3);

        assert!(store.update_title("missing", "x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn close_is_soft() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        store.close("s1").await.unwrap();

        let session = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn delete_removes_messages_and_queue() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        store.create(&new_session("s2")).await.unwrap();
        store
            .append_message("s1", MessageRole::User, "hello", false)
            .await
            .unwrap();
        store.enqueue("s1", "pending").await.unwrap();
        store.enqueue("s2", "other").await.unwrap();

        assert!(ConversationRepository::delete(&store, "s1").await.unwrap());
        assert!(!ConversationRepository::delete(&store, "s1").await.unwrap());

        assert!(store.find_by_id("s1").await.unwrap().is_none());
        assert!(store.list_messages("s1").await.unwrap().is_empty());
        assert!(store.list("s1").await.unwrap().is_empty());
        assert_eq!(store.list("s2").await.unwrap().len(), 1);

        let orphans: i64 = store
            .run_blocking(|conn| {
                conn.query_row("SELECT COUNT(*) FROM conversation_messages", [], |row| row.get(0))
                    .db()
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn transcript_keeps_insertion_order_and_interrupt_flag() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        store
            .append_message("s1", MessageRole::User, "question", false)
            .await
            .unwrap();
        store
            .append_message("s1", MessageRole::Assistant, "partial ans", true)
            .await
            .unwrap();

        let messages = store.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "partial ans");
        assert!(messages[1].interrupted);

        let err = store
            .append_message("missing", MessageRole::User, "x", false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn queue_snapshot_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        assert!(store.load_queue_snapshot("s1").await.unwrap().is_empty());

        store.enqueue("s1", "a").await.unwrap();
        store.enqueue("s1", "b").await.unwrap();
        let items = store.list("s1").await.unwrap();
        store.save_queue_snapshot("s1", &items).await.unwrap();

        assert_eq!(store.load_queue_snapshot("s1").await.unwrap(), items);
    }

    #[tokio::test]
    async fn corrupt_snapshot_reads_as_empty() {
        let store = SqliteStore::in_memory().unwrap();
        store.create(&new_session("s1")).await.unwrap();
        store
            .run_blocking(|conn| {
                conn.execute(
                    "UPDATE conversations SET queued_messages = 'not json' WHERE session_uuid = 's1'",
                    [],
                )
                .db()
            })
            .await
            .unwrap();

        assert!(store.load_queue_snapshot("s1").await.unwrap().is_empty());
        assert!(store.load_queue_snapshot("missing").await.unwrap_err().is_not_found());
    }
}
