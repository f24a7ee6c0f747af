//! Session domain module.
//!
//! This module contains the conversation metadata model, its repository
//! interface, and the events a session publishes to the UI.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `SessionStatus`)
//! - `message`: Transcript entries (`MessageRole`, `ConversationMessage`)
//! - `repository`: Repository trait for conversation persistence
//! - `event`: UI-facing events and the sink they are published to
//!
//! # Usage
//!
//! ```ignore
//! use cadence_core::session::{Session, SessionStatus, ConversationRepository};
//! use cadence_core::session::{UiEvent, UiEventKind, EventSink};
//! ```

mod event;
mod message;
mod model;
mod repository;

// Re-export public API
pub use event::{EventSink, NullEventSink, UiEvent, UiEventKind};
pub use message::{ConversationMessage, MessageRole};
pub use model::{NewSession, Session, SessionStatus};
pub use repository::ConversationRepository;
