//! The coordinator: owns the canonical state, follows upstream, and
//! arbitrates submitted commits from connected miners.

pub mod config;
pub mod gate;
pub mod ledger;
pub mod registry;
pub mod repo;
pub mod server;
pub mod state;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CoordinatorConfig;
pub use gate::{Gate, InvalidReason, Verdict};
pub use registry::ClientRegistry;
pub use repo::{GitRepository, PushOutcome, RepoError, Repository};
pub use server::Server;
pub use state::{CoordinatorError, CoordinatorState, PushStats, StateSettings};
pub use sync::{SyncOutcome, Synchronizer};
