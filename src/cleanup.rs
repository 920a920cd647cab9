//! Source-side cleanup, run as a separate phase after migration.
//!
//! Cleanup only ever touches records whose resource has verifiably
//! landed on the destination: `completed`, `pending-cleanup`, or a
//! previous cleanup attempt that failed. Records still `pending-members`
//! are left alone, since a dependent might yet need the source copy.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{CleanupError, HandlerError};
use crate::handlers::HandlerRegistry;
use crate::plan;
use crate::resource::ResourceType;
use crate::status::MigrationStatus;
use crate::store::{MigrationRecord, MigrationStore, RecordQuery};

/// Narrowing criteria for a cleanup pass. An empty filter selects every
/// eligible record; callers decide whether that requires explicit
/// opt-in.
#[derive(Debug, Clone, Default)]
pub struct CleanupFilter {
    pub service: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub source_id: Option<String>,
}

impl CleanupFilter {
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.resource_type.is_none() && self.source_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Eligible records matched by the filter.
    pub selected: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct CleanupCoordinator {
    store: MigrationStore,
    registry: Arc<HandlerRegistry>,
}

impl CleanupCoordinator {
    pub fn new(store: MigrationStore, registry: Arc<HandlerRegistry>) -> Self {
        Self { store, registry }
    }

    /// Delete source copies of migrated resources matching the filter.
    /// With `dry_run` the selection is logged and nothing is mutated,
    /// neither on the source cloud nor in the store.
    pub async fn run(
        &self,
        filter: &CleanupFilter,
        dry_run: bool,
    ) -> Result<CleanupSummary, CleanupError> {
        let records = self.select(filter).await?;
        let mut summary = CleanupSummary {
            selected: records.len(),
            ..CleanupSummary::default()
        };

        for record in records {
            if dry_run {
                info!(
                    resource_type = %record.resource_type,
                    source_id = %record.source_id,
                    "DRY-RUN: would delete source resource"
                );
                continue;
            }
            let handler = self.registry.get(record.resource_type);
            match handler.delete_source(&record.source_id).await {
                Ok(()) => {
                    self.store.mark_source_removed(record.uuid).await?;
                    info!(
                        resource_type = %record.resource_type,
                        source_id = %record.source_id,
                        "source resource removed"
                    );
                    summary.removed += 1;
                }
                Err(e @ HandlerError::StillInUse(_)) => {
                    // Expected while other source resources still hold a
                    // reference; a later pass will retry.
                    warn!(
                        resource_type = %record.resource_type,
                        source_id = %record.source_id,
                        error = %e,
                        "source resource still in use"
                    );
                    self.store
                        .set_status(record.uuid, MigrationStatus::SourceCleanupFailed)
                        .await?;
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(
                        resource_type = %record.resource_type,
                        source_id = %record.source_id,
                        error = %e,
                        "source cleanup failed"
                    );
                    self.store
                        .set_status(record.uuid, MigrationStatus::SourceCleanupFailed)
                        .await?;
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Eligible records, dependents before their dependencies so source
    /// references are released in an order that can actually succeed.
    async fn select(&self, filter: &CleanupFilter) -> Result<Vec<MigrationRecord>, CleanupError> {
        let mut query = RecordQuery::default().source_removed(false);
        if let Some(service) = &filter.service {
            query = query.service(service.clone());
        }
        if let Some(resource_type) = filter.resource_type {
            query = query.resource_type(resource_type);
        }
        if let Some(source_id) = &filter.source_id {
            query = query.source_id(source_id.clone());
        }

        let mut records: Vec<MigrationRecord> = self
            .store
            .list(&query)
            .await?
            .into_iter()
            .filter(|r| {
                matches!(
                    r.status,
                    MigrationStatus::Completed
                        | MigrationStatus::PendingCleanup
                        | MigrationStatus::SourceCleanupFailed
                )
            })
            .collect();

        let types: Vec<ResourceType> = {
            let mut seen = Vec::new();
            for record in &records {
                if !seen.contains(&record.resource_type) {
                    seen.push(record.resource_type);
                }
            }
            seen
        };
        // The type graph is validated acyclic at startup.
        let order = plan::order_types(&types).expect("dependency graph is acyclic");
        let rank = |rt: ResourceType| order.iter().position(|&t| t == rt).unwrap_or(0);
        records.sort_by_key(|r| std::cmp::Reverse(rank(r.resource_type)));
        Ok(records)
    }
}
