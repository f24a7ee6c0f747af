//! SQLite-backed storage.
//!
//! One [`SqliteStore`] owns the connection and implements both
//! [`MessageQueueRepository`](cadence_core::queue::MessageQueueRepository) and
//! [`ConversationRepository`](cadence_core::session::ConversationRepository).
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool, so all statements are serialized and multi-statement operations use
//! explicit transactions.

mod conversation;
mod queue;
mod schema;

use cadence_core::{CadenceError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Maps driver errors into the domain error at the storage boundary.
pub(crate) trait SqlContext<T> {
    fn db(self) -> Result<T>;
}

impl<T> SqlContext<T> for std::result::Result<T, rusqlite::Error> {
    fn db(self) -> Result<T> {
        self.map_err(|e| CadenceError::data_access(e.to_string()))
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and migrates it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut conn = Connection::open(&db_path).db()?;
            Self::prepare(&mut conn)?;
            tracing::info!("[Storage] Opened {}", db_path.display());
            Ok(conn)
        })
        .await
        .map_err(|e| CadenceError::internal(format!("Failed to spawn blocking task: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().db()?;
        Self::prepare(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn prepare(conn: &mut Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").db()?;
        schema::apply_migrations(conn).db()
    }

    /// Current schema version of the connected database.
    pub async fn schema_version(&self) -> Result<i64> {
        self.run_blocking(|conn| {
            conn.query_row("PRAGMA user_version", [], |row| row.get(0))
                .db()
        })
        .await
    }

    /// Latest schema version this build knows.
    pub fn latest_schema_version() -> i64 {
        schema::schema_version()
    }

    pub(crate) async fn run_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn_arc
                .lock()
                .map_err(|_| CadenceError::internal("database connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CadenceError::internal(format!("Task execution failed: {}", e)))?
    }
}

/// Default database location, honoring a configured override.
pub fn resolve_database_path(configured: Option<&str>) -> Result<PathBuf> {
    match configured {
        Some(path) if !path.trim().is_empty() => Ok(Path::new(path).to_path_buf()),
        _ => Ok(crate::paths::CadencePaths::database_file()?),
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
