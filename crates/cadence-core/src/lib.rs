pub mod agent;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod turn;

// Re-export common error type
pub use error::{CadenceError, Result};
