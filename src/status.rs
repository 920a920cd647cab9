//! Migration status state machine.
//!
//! A record moves through these states exactly once per attempt:
//!
//! ```text
//! (none) ----------------> InProgress
//! InProgress ------------> Completed | PendingMembers | Failed
//! Failed ----------------> InProgress            (retry)
//! PendingMembers --------> PendingCleanup        (dependents resolved)
//! Completed | PendingCleanup --cleanup--> Completed (source_removed)
//! Completed | PendingCleanup --cleanup--> SourceCleanupFailed
//! SourceCleanupFailed ---> Completed             (cleanup retry)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MigrationStatus {
    /// A migration attempt is executing (or crashed mid-flight).
    InProgress,
    /// Migration succeeded; the source resource is untouched unless
    /// `source_removed` is set.
    Completed,
    /// The last attempt failed; no destination id exists.
    Failed,
    /// Migrated, but dependent resources are still outstanding so the
    /// source must not be cleaned up yet.
    PendingMembers,
    /// All tracked dependents resolved; eligible for source cleanup.
    PendingCleanup,
    /// Migrated, but deleting the source failed.
    SourceCleanupFailed,
}

/// States in which the destination id exists and may be consumed by
/// dependent resources.
pub const MIGRATED_STATUSES: [MigrationStatus; 4] = [
    MigrationStatus::Completed,
    MigrationStatus::SourceCleanupFailed,
    MigrationStatus::PendingMembers,
    MigrationStatus::PendingCleanup,
];

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PendingMembers => "pending-members",
            Self::PendingCleanup => "pending-cleanup",
            Self::SourceCleanupFailed => "source-cleanup-failed",
        }
    }

    /// True once the resource exists on the destination cloud and its
    /// destination id may be referenced by dependents.
    pub fn is_migrated(self) -> bool {
        MIGRATED_STATUSES.contains(&self)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown migration status: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for MigrationStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "pending-members" => Ok(Self::PendingMembers),
            "pending-cleanup" => Ok(Self::PendingCleanup),
            "source-cleanup-failed" => Ok(Self::SourceCleanupFailed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for MigrationStatus {
    type Error = InvalidStatus;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MigrationStatus> for String {
    fn from(status: MigrationStatus) -> Self {
        status.as_str().to_string()
    }
}
