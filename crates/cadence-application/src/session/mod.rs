//! Live sessions.
//!
//! An [`AgentSession`] couples one conversation with one agent process and
//! owns its turn state. The [`AgentSessionManager`] opens, restores and closes
//! sessions and runs the task that feeds each one its transport events.

mod agent_session;
mod cache;
mod manager;
mod sink;

pub use agent_session::{AgentSession, SendOutcome, SessionServices, SessionSnapshot};
pub use cache::SessionCache;
pub use manager::AgentSessionManager;
pub use sink::ChannelEventSink;
