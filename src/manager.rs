//! Migration orchestrator: drives each requested resource through the
//! persisted status state machine.
//!
//! The manager owns all record mutation during a run. Handlers never
//! touch the store; they report success or failure and the manager
//! persists the outcome. One worker processes one resource, so writes
//! for a single record are serialized; independent resources within a
//! batch run concurrently up to the configured parallelism. A run
//! cancelled mid-flight leaves at most `in-progress` records behind,
//! which the staleness check turns back into retries on the next run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{PlanError, RunError, StoreError};
use crate::handlers::{HandlerRegistry, ResourceHandler};
use crate::plan;
use crate::resource::ResourceType;
use crate::status::MigrationStatus;
use crate::store::{MigrationStore, RecordQuery};

/// Tuning knobs for a run. Parallelism is a throughput option, not a
/// correctness requirement; everything holds at parallelism = 1.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Concurrent migrations within one resource-type batch.
    pub parallelism: usize,
    /// Upper bound on a single `migrate_one` invocation.
    pub handler_timeout: Duration,
    /// Age past which an `in-progress` record is presumed crashed and
    /// retried; idempotent re-invocation is the recovery mechanism.
    pub stale_after: chrono::Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallelism: 4,
            handler_timeout: Duration::from_secs(300),
            stale_after: chrono::Duration::hours(1),
        }
    }
}

/// What to migrate. Explicit source ids require exactly one resource
/// type; otherwise ids are enumerated from the source cloud through the
/// handler's filters.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub resource_types: Vec<ResourceType>,
    pub source_ids: Vec<String>,
    pub filters: BTreeMap<String, String>,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.blocked == 0
    }
}

enum Outcome {
    Migrated,
    Skipped,
    Failed,
    Blocked,
}

pub struct MigrationManager {
    store: MigrationStore,
    registry: Arc<HandlerRegistry>,
    settings: RunSettings,
}

impl MigrationManager {
    /// The type-level dependency graph is validated here, before any
    /// resource is touched; a cycle is a configuration error.
    pub fn new(
        store: MigrationStore,
        registry: HandlerRegistry,
        settings: RunSettings,
    ) -> Result<Self, PlanError> {
        plan::validate_graph()?;
        Ok(Self {
            store,
            registry: Arc::new(registry),
            settings,
        })
    }

    pub fn store(&self) -> &MigrationStore {
        &self.store
    }

    /// Run a migration over the requested resource selection. Returns
    /// the tally; per-resource failures are persisted as `failed`
    /// records, never propagated.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, RunError> {
        if request.resource_types.is_empty() {
            return Err(RunError::InvalidInput(
                "no resource types requested".to_string(),
            ));
        }
        if !request.source_ids.is_empty() && request.resource_types.len() != 1 {
            return Err(RunError::InvalidInput(
                "explicit source ids require exactly one resource type".to_string(),
            ));
        }

        let order = plan::order_types(&request.resource_types)?;
        let mut summary = RunSummary::default();
        let mut attempted: HashSet<ResourceType> = HashSet::new();

        for (index, &resource_type) in order.iter().enumerate() {
            let handler = self.registry.get(resource_type);

            let source_ids = if request.source_ids.is_empty() {
                match handler.source_resource_ids(&request.filters).await {
                    Ok(ids) => ids,
                    Err(e @ crate::error::HandlerError::InvalidInput(_)) => {
                        // Pure input validation surfaces immediately.
                        return Err(RunError::InvalidInput(e.to_string()));
                    }
                    Err(e) => {
                        error!(
                            resource_type = %resource_type,
                            error = %e,
                            "failed to enumerate source resources, skipping batch"
                        );
                        continue;
                    }
                }
            } else {
                request.source_ids.clone()
            };

            // A dependency type migrated in this run that yielded no
            // consumable record at all blocks the whole dependent batch:
            // no valid destination id could possibly be handed down.
            let blocked_by = self
                .blocked_by(resource_type, &attempted)
                .await?;
            attempted.insert(resource_type);

            // Later batches of this run may contain dependents; their
            // dependency must wait in pending-members until they settle.
            let dependents_in_run = order[index + 1..]
                .iter()
                .any(|later| later.dependencies().contains(&resource_type));

            info!(
                resource_type = %resource_type,
                resources = source_ids.len(),
                "migrating batch"
            );

            let outcomes: Vec<Result<Outcome, StoreError>> = stream::iter(source_ids)
                .map(|source_id| {
                    self.migrate_resource(
                        Arc::clone(&handler),
                        source_id,
                        request.force,
                        blocked_by,
                        dependents_in_run,
                    )
                })
                .buffer_unordered(self.settings.parallelism.max(1))
                .collect()
                .await;

            for outcome in outcomes {
                match outcome? {
                    Outcome::Migrated => summary.migrated += 1,
                    Outcome::Skipped => summary.skipped += 1,
                    Outcome::Failed => summary.failed += 1,
                    Outcome::Blocked => summary.blocked += 1,
                }
            }
        }

        let promoted = self.resolve_pending_members().await?;
        if promoted > 0 {
            debug!(promoted, "pending-members records promoted to pending-cleanup");
        }
        Ok(summary)
    }

    async fn blocked_by(
        &self,
        resource_type: ResourceType,
        attempted: &HashSet<ResourceType>,
    ) -> Result<Option<ResourceType>, StoreError> {
        for &dep in resource_type.dependencies() {
            if attempted.contains(&dep) && self.store.count_migrated(dep).await? == 0 {
                return Ok(Some(dep));
            }
        }
        Ok(None)
    }

    async fn migrate_resource(
        &self,
        handler: Arc<dyn ResourceHandler>,
        source_id: String,
        force: bool,
        blocked_by: Option<ResourceType>,
        dependents_in_run: bool,
    ) -> Result<Outcome, StoreError> {
        let resource_type = handler.resource_type();

        let record = match self.store.find(resource_type, &source_id).await? {
            Some(record) if record.status.is_migrated() && !force => {
                debug!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    status = %record.status,
                    "already migrated, skipping"
                );
                return Ok(Outcome::Skipped);
            }
            Some(record) if record.status == MigrationStatus::InProgress => {
                let age = chrono::Utc::now() - record.updated_at;
                if age <= self.settings.stale_after {
                    // Another run owns this record; do not race it.
                    warn!(
                        resource_type = %resource_type,
                        source_id = %source_id,
                        "migration already in progress, skipping"
                    );
                    return Ok(Outcome::Skipped);
                }
                warn!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    age_secs = age.num_seconds(),
                    "stale in-progress record, re-attempting"
                );
                self.store.mark_in_progress(record.uuid).await?;
                record
            }
            Some(record) => {
                self.store.mark_in_progress(record.uuid).await?;
                record
            }
            None => {
                self.store
                    .create_in_progress(resource_type, &source_id)
                    .await?
            }
        };

        if let Some(dep) = blocked_by {
            let cause = format!("blocked by dependency: no migrated {dep} available");
            warn!(
                resource_type = %resource_type,
                source_id = %source_id,
                "{cause}"
            );
            self.store.fail(record.uuid, &cause).await?;
            return Ok(Outcome::Blocked);
        }

        let triples = self
            .store
            .migrated_triples(&resource_type.dependency_closure())
            .await?;

        let attempt = tokio::time::timeout(
            self.settings.handler_timeout,
            handler.migrate_one(&source_id, &triples),
        )
        .await;

        match attempt {
            Ok(Ok(destination_id)) => {
                let status = if dependents_in_run {
                    MigrationStatus::PendingMembers
                } else {
                    MigrationStatus::Completed
                };
                self.store
                    .complete(record.uuid, &destination_id, status)
                    .await?;
                info!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    destination_id = %destination_id,
                    status = %status,
                    "resource migrated"
                );
                Ok(Outcome::Migrated)
            }
            Ok(Err(e)) => {
                error!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    error = %e,
                    "migration attempt failed"
                );
                self.store.fail(record.uuid, &e.to_string()).await?;
                Ok(Outcome::Failed)
            }
            Err(_elapsed) => {
                let cause = format!(
                    "handler timed out after {:?}",
                    self.settings.handler_timeout
                );
                error!(
                    resource_type = %resource_type,
                    source_id = %source_id,
                    "{cause}"
                );
                self.store.fail(record.uuid, &cause).await?;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Promote `pending-members` records whose tracked dependents have
    /// all reached a migrated state. A failed or in-progress dependent
    /// keeps its dependency parked, so cleanup cannot touch it early.
    pub async fn resolve_pending_members(&self) -> Result<usize, StoreError> {
        let pending = self
            .store
            .list(&RecordQuery::default().status(MigrationStatus::PendingMembers))
            .await?;
        let mut promoted = 0;
        for record in pending {
            let dependents = record.resource_type.dependents();
            if self.store.count_unmigrated(&dependents).await? == 0 {
                self.store
                    .set_status(record.uuid, MigrationStatus::PendingCleanup)
                    .await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }
}
