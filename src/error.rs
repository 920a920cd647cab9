//! Error types, one enum per concern.
//!
//! Handler errors are always caught at the orchestrator boundary and
//! converted into a persisted `failed` status; they never abort sibling
//! resources. Only pure input-validation errors propagate to the caller
//! of a batch operation.

use crate::resource::{InvalidResourceType, ResourceType};
use crate::session::SessionError;
use crate::status::InvalidStatus;

/// Errors raised by resource handlers while enumerating, migrating or
/// deleting a single resource.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Bad caller-supplied filter or type. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The source resource vanished mid-run. Retryable if it reappears.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Ambiguous natural-key match on the destination; requires operator
    /// disambiguation.
    #[error("multiple destination resources named '{name}' for {resource_type}")]
    MultipleResourcesFound {
        resource_type: ResourceType,
        name: String,
    },

    /// The operation cannot be completed for this resource at all.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// A referenced resource has no migrated record yet.
    #[error("blocked by dependency: {resource_type} {source_id} has not been migrated")]
    MissingDependency {
        resource_type: ResourceType,
        source_id: String,
    },

    /// The source resource is still referenced by others; cleanup may be
    /// retried once the references are gone.
    #[error("resource still in use: {0}")]
    StillInUse(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl HandlerError {
    /// Whether a later re-attempt can plausibly succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_)
            | Self::StillInUse(_)
            | Self::Session(_)
            | Self::MissingDependency { .. } => true,
            Self::InvalidInput(_) | Self::MultipleResourcesFound { .. } | Self::NotSupported(_) => {
                false
            }
        }
    }
}

/// Migration record store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),

    #[error(transparent)]
    InvalidResourceType(#[from] InvalidResourceType),

    #[error("malformed record {uuid}: {reason}")]
    MalformedRecord { uuid: String, reason: String },
}

/// Dependency resolution failures. These are configuration errors and
/// fail fast before any resource is touched.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("dependency cycle involving resource type {0}")]
    DependencyCycle(ResourceType),
}

/// Fatal orchestration errors. Per-resource handler failures are not
/// among them; those become `failed` records instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Cleanup coordination failures; per-record delete failures become
/// `source-cleanup-failed` records instead.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
