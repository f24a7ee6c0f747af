use super::agent_session::AgentSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory registry of live sessions.
///
/// A session is present from the moment its agent process is launched until
/// it is closed or deleted.
pub struct SessionCache {
    sessions: Arc<RwLock<HashMap<String, Arc<AgentSession>>>>,
}

impl SessionCache {
    /// Creates a new empty SessionCache.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Gets a live session by ID.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The ID of the session to retrieve
    ///
    /// # Returns
    ///
    /// `Some(session)` if the session is live, `None` otherwise.
    pub async fn get(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Inserts a session, returning any previous entry with the same ID.
    pub async fn insert(&self, session: Arc<AgentSession>) -> Option<Arc<AgentSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id().to_string(), session)
    }

    /// Removes a session from the cache.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The ID of the session to remove
    pub async fn remove(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    pub async fn ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Empties the cache and hands back everything it held.
    pub async fn drain(&self) -> Vec<Arc<AgentSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, session)| session).collect()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}
