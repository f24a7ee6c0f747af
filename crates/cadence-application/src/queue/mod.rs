//! Queue use cases and the auto-dispatch policy.

mod coordinator;
mod service;

pub use coordinator::{AutoDispatch, QueueCoordinator, TurnStarter};
pub use service::{QueueService, SessionQueue};
