//! Application layer for cadence.
//!
//! Use cases that tie the domain model to storage and to the agent process:
//! queue maintenance, the auto-dispatch policy and live session coordination.

pub mod queue;
pub mod session;

pub use queue::{AutoDispatch, QueueCoordinator, QueueService, SessionQueue, TurnStarter};
pub use session::{AgentSession, AgentSessionManager, ChannelEventSink, SendOutcome, SessionServices};
