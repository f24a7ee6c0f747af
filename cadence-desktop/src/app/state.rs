use std::sync::Arc;

use cadence_application::{AgentSessionManager, QueueService};
use cadence_core::session::ConversationRepository;

/// Everything a command handler needs, built once at startup and passed
/// explicitly.
pub struct AppContext {
    pub session_manager: Arc<AgentSessionManager>,
    pub queue_service: Arc<QueueService>,
    pub conversations: Arc<dyn ConversationRepository>,
}
