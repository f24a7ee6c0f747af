//! The agent's line-delimited JSON protocol.
//!
//! Inbound bytes go through [`EventFramer`] and then [`ProtocolDispatcher`];
//! outbound commands are [`OutboundMessage`] lines.

pub mod dispatcher;
pub mod event;
pub mod framer;
pub mod outbound;

pub use dispatcher::{HistoryEntry, ProtocolDispatcher};
pub use event::{AgentEvent, TokenUsage, TurnResult};
pub use framer::{EventFramer, Frame};
pub use outbound::{COMPACT_COMMAND, OutboundMessage};
