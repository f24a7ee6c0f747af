//! Interaction layer: running the external agent CLI.

pub mod local_agents;

pub use local_agents::{ClaudeCodeLauncher, ProcessTransport};
