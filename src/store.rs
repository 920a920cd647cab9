//! Durable migration record store.
//!
//! One row per (resource_type, source_id); the sole source of truth for
//! what has and hasn't been migrated. Records are never deleted by
//! normal operation: only status, destination_id, source_removed and
//! last_error are mutated in place, leaving an append-mostly audit log.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::resource::ResourceType;
use crate::status::{MigrationStatus, MIGRATED_STATUSES};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS migrations (
    uuid TEXT PRIMARY KEY,
    service TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    destination_id TEXT,
    status TEXT NOT NULL,
    source_removed INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (resource_type, source_id)
);
CREATE INDEX IF NOT EXISTS idx_migrations_status ON migrations (status);
CREATE INDEX IF NOT EXISTS idx_migrations_service ON migrations (service);
";

/// Persisted state of one resource's migration attempt and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub uuid: Uuid,
    pub service: String,
    pub resource_type: ResourceType,
    pub source_id: String,
    pub destination_id: Option<String>,
    pub status: MigrationStatus,
    pub source_removed: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A migrated dependency triple handed to handlers so they can translate
/// source-side references into destination-side ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedResource {
    pub resource_type: ResourceType,
    pub source_id: String,
    pub destination_id: String,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    uuid: String,
    service: String,
    resource_type: String,
    source_id: String,
    destination_id: Option<String>,
    status: String,
    source_removed: bool,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for MigrationRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let uuid = Uuid::parse_str(&row.uuid).map_err(|e| StoreError::MalformedRecord {
            uuid: row.uuid.clone(),
            reason: e.to_string(),
        })?;
        Ok(MigrationRecord {
            uuid,
            service: row.service,
            resource_type: row.resource_type.parse()?,
            source_id: row.source_id,
            destination_id: row.destination_id,
            status: row.status.parse()?,
            source_removed: row.source_removed,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Field a [`RecordQuery`] may order by. Kept as an enum so a typo is a
/// compile error rather than SQL smuggled through a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Service,
    ResourceType,
    Status,
}

impl OrderField {
    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Service => "service",
            Self::ResourceType => "resource_type",
            Self::Status => "status",
        }
    }
}

/// Exact-match filter over migration records plus an ordering choice.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub service: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub source_id: Option<String>,
    pub status: Option<MigrationStatus>,
    pub source_removed: Option<bool>,
    pub order_by: OrderField,
    pub descending: bool,
}

impl RecordQuery {
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn status(mut self, status: MigrationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn source_removed(mut self, source_removed: bool) -> Self {
        self.source_removed = Some(source_removed);
        self
    }

    fn apply(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(service) = &self.service {
            builder.push(" AND service = ").push_bind(service.clone());
        }
        if let Some(resource_type) = self.resource_type {
            builder
                .push(" AND resource_type = ")
                .push_bind(resource_type.name());
        }
        if let Some(source_id) = &self.source_id {
            builder.push(" AND source_id = ").push_bind(source_id.clone());
        }
        if let Some(status) = self.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(source_removed) = self.source_removed {
            builder
                .push(" AND source_removed = ")
                .push_bind(source_removed);
        }
        builder
            .push(" ORDER BY ")
            .push(self.order_by.column())
            .push(if self.descending { " DESC" } else { " ASC" });
    }
}

/// Handle to the migrations table. Opened once at startup and passed
/// explicitly to the orchestrator and the cleanup coordinator.
#[derive(Clone)]
pub struct MigrationStore {
    pool: SqlitePool,
}

impl MigrationStore {
    /// Open (creating if absent) the database file and bootstrap the
    /// schema. The parent directory is created first.
    pub async fn open(database_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }
        // WAL allows concurrent readers while a run is writing; the busy
        // timeout covers contention with a concurrently running CLI.
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(10));
        let pool = SqlitePool::connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// A single-connection pool: every pooled connection to `:memory:`
    /// would otherwise open its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn find(
        &self,
        resource_type: ResourceType,
        source_id: &str,
    ) -> Result<Option<MigrationRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM migrations WHERE resource_type = ? AND source_id = ?",
        )
        .bind(resource_type.name())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MigrationRecord::try_from).transpose()
    }

    /// Create a fresh `in-progress` record for a first attempt.
    pub async fn create_in_progress(
        &self,
        resource_type: ResourceType,
        source_id: &str,
    ) -> Result<MigrationRecord, StoreError> {
        let now = Utc::now();
        let record = MigrationRecord {
            uuid: Uuid::new_v4(),
            service: resource_type.service().to_string(),
            resource_type,
            source_id: source_id.to_string(),
            destination_id: None,
            status: MigrationStatus::InProgress,
            source_removed: false,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO migrations
             (uuid, service, resource_type, source_id, destination_id, status,
              source_removed, last_error, created_at, updated_at)
             VALUES (?, ?, ?, ?, NULL, ?, 0, NULL, ?, ?)",
        )
        .bind(record.uuid.to_string())
        .bind(&record.service)
        .bind(record.resource_type.name())
        .bind(&record.source_id)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    /// Flip an existing record back to `in-progress` for a retry.
    /// A non-migrated status never carries a destination id, so any
    /// previously persisted one is cleared here.
    pub async fn mark_in_progress(&self, uuid: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE migrations
             SET status = ?, destination_id = NULL, last_error = NULL, updated_at = ?
             WHERE uuid = ?",
        )
        .bind(MigrationStatus::InProgress.as_str())
        .bind(Utc::now())
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a successful migration attempt: persist the destination id
    /// and the chosen migrated status.
    pub async fn complete(
        &self,
        uuid: Uuid,
        destination_id: &str,
        status: MigrationStatus,
    ) -> Result<(), StoreError> {
        debug_assert!(status.is_migrated());
        sqlx::query(
            "UPDATE migrations
             SET status = ?, destination_id = ?, last_error = NULL, updated_at = ?
             WHERE uuid = ?",
        )
        .bind(status.as_str())
        .bind(destination_id)
        .bind(Utc::now())
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt along with the cause, for operator
    /// inspection and retry.
    pub async fn fail(&self, uuid: Uuid, cause: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE migrations
             SET status = ?, destination_id = NULL, last_error = ?, updated_at = ?
             WHERE uuid = ?",
        )
        .bind(MigrationStatus::Failed.as_str())
        .bind(cause)
        .bind(Utc::now())
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, uuid: Uuid, status: MigrationStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE migrations SET status = ?, updated_at = ? WHERE uuid = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record successful source cleanup: the record settles as
    /// `completed` with `source_removed` set.
    pub async fn mark_source_removed(&self, uuid: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE migrations
             SET status = ?, source_removed = 1, updated_at = ?
             WHERE uuid = ?",
        )
        .bind(MigrationStatus::Completed.as_str())
        .bind(Utc::now())
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, query: &RecordQuery) -> Result<Vec<MigrationRecord>, StoreError> {
        let mut builder = QueryBuilder::new("SELECT * FROM migrations WHERE 1 = 1");
        query.apply(&mut builder);
        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(MigrationRecord::try_from).collect()
    }

    /// Dependency triples for the given resource types: every record in a
    /// migrated state, oldest first.
    pub async fn migrated_triples(
        &self,
        resource_types: &[ResourceType],
    ) -> Result<Vec<MigratedResource>, StoreError> {
        if resource_types.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new(
            "SELECT resource_type, source_id, destination_id FROM migrations WHERE status IN (",
        );
        let mut separated = builder.separated(", ");
        for status in MIGRATED_STATUSES {
            separated.push_bind(status.as_str());
        }
        builder.push(") AND resource_type IN (");
        let mut separated = builder.separated(", ");
        for resource_type in resource_types {
            separated.push_bind(resource_type.name());
        }
        builder.push(") ORDER BY created_at ASC");

        let rows: Vec<(String, String, Option<String>)> =
            builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(resource_type, source_id, destination_id)| {
                let resource_type: ResourceType = resource_type.parse()?;
                let destination_id =
                    destination_id.ok_or_else(|| StoreError::MalformedRecord {
                        uuid: format!("{resource_type}:{source_id}"),
                        reason: "migrated record without destination_id".to_string(),
                    })?;
                Ok(MigratedResource {
                    resource_type,
                    source_id,
                    destination_id,
                })
            })
            .collect()
    }

    /// Number of records of `resource_type` whose destination id is
    /// consumable by dependents.
    pub async fn count_migrated(&self, resource_type: ResourceType) -> Result<i64, StoreError> {
        let mut builder = QueryBuilder::new(
            "SELECT COUNT(*) FROM migrations WHERE resource_type = ",
        );
        builder.push_bind(resource_type.name());
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in MIGRATED_STATUSES {
            separated.push_bind(status.as_str());
        }
        builder.push(")");
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) async fn backdate_updated_at(
        &self,
        uuid: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE migrations SET updated_at = ? WHERE uuid = ?")
            .bind(updated_at)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of tracked records of the given types that have not reached
    /// a migrated state. Zero means no tracked dependent is outstanding.
    pub async fn count_unmigrated(
        &self,
        resource_types: &[ResourceType],
    ) -> Result<i64, StoreError> {
        if resource_types.is_empty() {
            return Ok(0);
        }
        let mut builder =
            QueryBuilder::new("SELECT COUNT(*) FROM migrations WHERE resource_type IN (");
        let mut separated = builder.separated(", ");
        for resource_type in resource_types {
            separated.push_bind(resource_type.name());
        }
        builder.push(") AND status NOT IN (");
        let mut separated = builder.separated(", ");
        for status in MIGRATED_STATUSES {
            separated.push_bind(status.as_str());
        }
        builder.push(")");
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> MigrationStore {
        MigrationStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let store = store().await;
        let record = store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();

        let found = store
            .find(ResourceType::Domain, "d1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, record);
        assert_eq!(found.service, "keystone");
        assert_eq!(found.status, MigrationStatus::InProgress);
        assert!(found.destination_id.is_none());
        assert!(!found.source_removed);
    }

    #[tokio::test]
    async fn duplicate_record_is_rejected() {
        let store = store().await;
        store
            .create_in_progress(ResourceType::Volume, "v1")
            .await
            .unwrap();
        let err = store
            .create_in_progress(ResourceType::Volume, "v1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn complete_sets_destination_and_clears_error() {
        let store = store().await;
        let record = store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();
        store.fail(record.uuid, "boom").await.unwrap();
        store.mark_in_progress(record.uuid).await.unwrap();
        store
            .complete(record.uuid, "dst-1", MigrationStatus::Completed)
            .await
            .unwrap();

        let found = store
            .find(ResourceType::Domain, "d1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MigrationStatus::Completed);
        assert_eq!(found.destination_id.as_deref(), Some("dst-1"));
        assert!(found.last_error.is_none());
    }

    #[tokio::test]
    async fn fail_records_cause() {
        let store = store().await;
        let record = store
            .create_in_progress(ResourceType::Secret, "s1")
            .await
            .unwrap();
        store.fail(record.uuid, "resource not found: s1").await.unwrap();

        let found = store
            .find(ResourceType::Secret, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MigrationStatus::Failed);
        assert_eq!(found.last_error.as_deref(), Some("resource not found: s1"));
    }

    #[tokio::test]
    async fn fail_and_retry_clear_stale_destination_id() {
        let store = store().await;
        let record = store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();
        store
            .complete(record.uuid, "dst-1", MigrationStatus::Completed)
            .await
            .unwrap();

        // A forced re-attempt of a migrated record that then fails must
        // not leave the old destination id on a failed row.
        store.mark_in_progress(record.uuid).await.unwrap();
        let found = store
            .find(ResourceType::Domain, "d1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MigrationStatus::InProgress);
        assert!(found.destination_id.is_none());

        store
            .complete(record.uuid, "dst-1", MigrationStatus::Completed)
            .await
            .unwrap();
        store.fail(record.uuid, "boom").await.unwrap();
        let found = store
            .find(ResourceType::Domain, "d1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MigrationStatus::Failed);
        assert!(found.destination_id.is_none());
    }

    #[tokio::test]
    async fn list_filters_by_service_and_status() {
        let store = store().await;
        let d = store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();
        store
            .complete(d.uuid, "dst-d1", MigrationStatus::Completed)
            .await
            .unwrap();
        store
            .create_in_progress(ResourceType::Volume, "v1")
            .await
            .unwrap();

        let keystone = store
            .list(&RecordQuery::default().service("keystone"))
            .await
            .unwrap();
        assert_eq!(keystone.len(), 1);
        assert_eq!(keystone[0].source_id, "d1");

        let completed = store
            .list(&RecordQuery::default().status(MigrationStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);

        let all = store.list(&RecordQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn list_orders_descending_when_asked() {
        let store = store().await;
        store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();
        store
            .create_in_progress(ResourceType::Domain, "d2")
            .await
            .unwrap();

        let query = RecordQuery {
            order_by: OrderField::CreatedAt,
            descending: true,
            ..RecordQuery::default()
        };
        let records = store.list(&query).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].created_at >= records[1].created_at);
    }

    #[tokio::test]
    async fn migrated_triples_skip_unmigrated_records() {
        let store = store().await;
        let d = store
            .create_in_progress(ResourceType::Domain, "d1")
            .await
            .unwrap();
        store
            .complete(d.uuid, "dst-d1", MigrationStatus::PendingMembers)
            .await
            .unwrap();
        let p = store
            .create_in_progress(ResourceType::Project, "p1")
            .await
            .unwrap();
        store.fail(p.uuid, "boom").await.unwrap();

        let triples = store
            .migrated_triples(&[ResourceType::Domain, ResourceType::Project])
            .await
            .unwrap();
        assert_eq!(
            triples,
            vec![MigratedResource {
                resource_type: ResourceType::Domain,
                source_id: "d1".to_string(),
                destination_id: "dst-d1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn unmigrated_count_tracks_failures() {
        let store = store().await;
        let p = store
            .create_in_progress(ResourceType::Project, "p1")
            .await
            .unwrap();
        assert_eq!(
            store.count_unmigrated(&[ResourceType::Project]).await.unwrap(),
            1
        );
        store
            .complete(p.uuid, "dst-p1", MigrationStatus::Completed)
            .await
            .unwrap();
        assert_eq!(
            store.count_unmigrated(&[ResourceType::Project]).await.unwrap(),
            0
        );
        assert_eq!(store.count_migrated(ResourceType::Project).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_source_removed_settles_record() {
        let store = store().await;
        let record = store
            .create_in_progress(ResourceType::VolumeType, "vt1")
            .await
            .unwrap();
        store
            .complete(record.uuid, "dst-vt1", MigrationStatus::PendingCleanup)
            .await
            .unwrap();
        store.mark_source_removed(record.uuid).await.unwrap();

        let found = store
            .find(ResourceType::VolumeType, "vt1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, MigrationStatus::Completed);
        assert!(found.source_removed);
    }
}
