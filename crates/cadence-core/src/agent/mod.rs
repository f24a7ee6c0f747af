//! Boundary to the external agent subprocess.
//!
//! The application layer talks to a running agent only through
//! [`AgentTransport`] (outbound) and the [`TransportEvent`] channel
//! (inbound). [`AgentLauncher`] creates both for a session.

mod env;

pub use env::build_agent_path;

use crate::error::Result;
use crate::protocol::{Frame, OutboundMessage};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Inbound traffic from a running agent, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A framed stdout line.
    Frame(Frame),
    /// The process exited; no more frames follow.
    Exited { code: Option<i32> },
}

/// Write side of a running agent.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Writes one command line. Returns once the write is flushed; it does not
    /// wait for the agent to react.
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    /// Stops the process. Idempotent.
    async fn shutdown(&self) -> Result<()>;

    fn is_alive(&self) -> bool;
}

/// Parameters for starting an agent for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub session_id: String,
    pub working_directory: PathBuf,
}

/// A started agent: its write side and its event stream.
pub struct LaunchedAgent {
    pub transport: std::sync::Arc<dyn AgentTransport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Starts agent processes.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent>;

    /// Whether the configured command can be found.
    async fn is_available(&self) -> bool;
}
