//! Runtime support: logging setup and the diagnostics layer that streams
//! warnings and errors to the UI.

pub mod logging;
pub mod tracing_layer;

pub use logging::{LoggingGuard, init_logging};
pub use tracing_layer::{DiagnosticEvent, DiagnosticsLayer};
