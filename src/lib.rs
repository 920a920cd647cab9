//! Cloud-to-cloud resource migration orchestrator.
//!
//! Resources are copied from a source cloud to a destination cloud,
//! dependencies first, with every attempt tracked in a persisted record
//! store so runs are idempotent and safe to retry after failures or
//! crashes. Source copies are only ever removed by a separate cleanup
//! phase, and only once the record store proves the resource (and its
//! dependents) landed on the destination.

pub mod cleanup;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod plan;
pub mod resource;
pub mod session;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{setup_tracing, Ctx};
pub use manager::{MigrationManager, RunRequest, RunSettings, RunSummary};
pub use resource::ResourceType;
pub use status::MigrationStatus;
pub use store::{MigrationRecord, MigrationStore};
