mod bootstrap;
mod state;

pub use bootstrap::{AppBootstrap, bootstrap};
#[cfg(test)]
pub(crate) use bootstrap::bootstrap_with_launcher;
pub use state::AppContext;
