//! Schema migrations, tracked with `PRAGMA user_version`.

use rusqlite::Connection;

/// Each entry upgrades the schema by one version. Append only.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_uuid TEXT NOT NULL UNIQUE,
        title TEXT,
        status TEXT NOT NULL DEFAULT 'idle',
        working_directory TEXT NOT NULL,
        api_profile_id TEXT,
        queued_messages TEXT NOT NULL DEFAULT '[]',
        total_cost_usd REAL NOT NULL DEFAULT 0,
        turn_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversation_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        interrupted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversation_messages_conversation
        ON conversation_messages(conversation_id);

    CREATE TABLE IF NOT EXISTS session_message_queue (
        id TEXT PRIMARY KEY,
        session_uuid TEXT NOT NULL,
        content TEXT NOT NULL,
        is_executed INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        executed_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_session_message_queue_pending
        ON session_message_queue(session_uuid, is_executed, created_at);
    "#,
];

pub(crate) fn schema_version() -> i64 {
    MIGRATIONS.len() as i64
}

pub(crate) fn apply_migrations(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, migration) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration)?;
        tx.pragma_update(None, "user_version", (index + 1) as i64)?;
        tx.commit()?;
        tracing::info!("[Storage] Applied schema migration {}", index + 1);
    }

    Ok(())
}
