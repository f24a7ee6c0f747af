//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs describe JSON stored inside SQLite columns. They are private
//! to the infrastructure layer so the stored shape can evolve without
//! touching the domain models.

mod queue_snapshot;

pub use queue_snapshot::{QueueSnapshotDTO, QueuedMessageDTO};
