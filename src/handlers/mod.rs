//! Resource handlers and their registry.
//!
//! A handler owns the per-resource-type logic: enumerate source
//! resources, migrate one, delete one. Most types share the same shape
//! (fetch source, reuse an existing destination resource with the same
//! name, copy a declared field list, remap references through migrated
//! dependency triples, create), captured by [`FieldMappedHandler`].
//! Types needing bespoke behavior implement [`ResourceHandler`] directly
//! (see `barbican`).

pub mod barbican;
pub mod cinder;
pub mod glance;
pub mod keystone;
pub mod manila;
pub mod neutron;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::HandlerError;
use crate::resource::ResourceType;
use crate::session::{DeleteOutcome, Resource, SessionPair};
use crate::store::MigratedResource;

/// Per-resource-type migration logic, consumed by the orchestrator and
/// the cleanup coordinator.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// The owning service, used for filtering and logging.
    fn service_type(&self) -> &'static str {
        self.resource_type().service()
    }

    /// Filter keys accepted by [`source_resource_ids`](Self::source_resource_ids).
    fn supported_filters(&self) -> Vec<&'static str>;

    /// Enumerate source resource ids matching the filters, in source
    /// enumeration order. Unknown filter keys are `InvalidInput`.
    async fn source_resource_ids(
        &self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, HandlerError>;

    /// Migrate one resource, returning the destination id. Idempotent in
    /// effect: an existing destination resource with the same name is
    /// reused rather than duplicated.
    async fn migrate_one(
        &self,
        source_id: &str,
        migrated: &[MigratedResource],
    ) -> Result<String, HandlerError>;

    /// Delete the source resource. Tolerates the resource already being
    /// absent; reports `StillInUse` when it is still referenced.
    async fn delete_source(&self, source_id: &str) -> Result<(), HandlerError>;
}

/// Static description of a field-mapped resource type.
pub(crate) struct HandlerSpec {
    pub resource_type: ResourceType,
    /// Attributes copied verbatim when present and non-empty.
    pub fields: &'static [&'static str],
    /// Attributes holding a source-side reference to another resource,
    /// remapped through the migrated dependency triples.
    pub refs: &'static [(&'static str, ResourceType)],
    /// Supported filter key -> source list query key.
    pub filters: &'static [(&'static str, &'static str)],
}

/// The common handler shape shared by most resource types.
pub(crate) struct FieldMappedHandler {
    spec: &'static HandlerSpec,
    sessions: SessionPair,
}

impl FieldMappedHandler {
    pub(crate) fn new(spec: &'static HandlerSpec, sessions: SessionPair) -> Self {
        Self { spec, sessions }
    }

    fn validate_filters(&self, filters: &BTreeMap<String, String>) -> Result<(), HandlerError> {
        for key in filters.keys() {
            if !self.spec.filters.iter().any(|(name, _)| name == key) {
                return Err(HandlerError::InvalidInput(format!(
                    "unsupported filter '{key}' for resource type {}",
                    self.spec.resource_type
                )));
            }
        }
        Ok(())
    }

    /// Only attributes that are present and non-empty make it into the
    /// create body.
    fn build_body(&self, source: &Resource) -> Map<String, Value> {
        let mut body = Map::new();
        if !source.name.is_empty() {
            body.insert("name".to_string(), Value::String(source.name.clone()));
        }
        for &field in self.spec.fields {
            match source.attrs.get(field) {
                None | Some(Value::Null) => {}
                Some(Value::Object(map)) if map.is_empty() => {}
                Some(value) => {
                    body.insert(field.to_string(), value.clone());
                }
            }
        }
        body
    }

    fn remap_refs(
        &self,
        source: &Resource,
        migrated: &[MigratedResource],
        body: &mut Map<String, Value>,
    ) -> Result<(), HandlerError> {
        for &(attr, dep_type) in self.spec.refs {
            let Some(source_ref) = source.attr_str(attr) else {
                continue;
            };
            let triple = migrated
                .iter()
                .find(|m| m.resource_type == dep_type && m.source_id == source_ref)
                .ok_or_else(|| HandlerError::MissingDependency {
                    resource_type: dep_type,
                    source_id: source_ref.to_string(),
                })?;
            body.insert(
                attr.to_string(),
                Value::String(triple.destination_id.clone()),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for FieldMappedHandler {
    fn resource_type(&self) -> ResourceType {
        self.spec.resource_type
    }

    fn supported_filters(&self) -> Vec<&'static str> {
        self.spec.filters.iter().map(|&(name, _)| name).collect()
    }

    async fn source_resource_ids(
        &self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, HandlerError> {
        self.validate_filters(filters)?;
        let query: Vec<(String, String)> = filters
            .iter()
            .map(|(key, value)| {
                let (_, query_key) = self
                    .spec
                    .filters
                    .iter()
                    .find(|(name, _)| name == key)
                    .expect("filter validated above");
                ((*query_key).to_string(), value.clone())
            })
            .collect();
        let resources = self
            .sessions
            .source
            .list(self.spec.resource_type, &query)
            .await?;
        Ok(resources.into_iter().map(|r| r.id).collect())
    }

    async fn migrate_one(
        &self,
        source_id: &str,
        migrated: &[MigratedResource],
    ) -> Result<String, HandlerError> {
        let kind = self.spec.resource_type;
        let source = self
            .sessions
            .source
            .get(kind, source_id)
            .await?
            .ok_or_else(|| HandlerError::NotFound(format!("{kind} {source_id}")))?;

        if !source.name.is_empty() {
            let existing = self
                .sessions
                .destination
                .find_by_name(kind, &source.name)
                .await?;
            match existing.as_slice() {
                [] => {}
                [found] => {
                    warn!(
                        resource_type = %kind,
                        name = %source.name,
                        destination_id = %found.id,
                        "destination resource already exists, reusing"
                    );
                    return Ok(found.id.clone());
                }
                _ => {
                    return Err(HandlerError::MultipleResourcesFound {
                        resource_type: kind,
                        name: source.name,
                    })
                }
            }
        }

        let mut body = self.build_body(&source);
        self.remap_refs(&source, migrated, &mut body)?;
        let created = self
            .sessions
            .destination
            .create(kind, Value::Object(body))
            .await?;
        Ok(created.id)
    }

    async fn delete_source(&self, source_id: &str) -> Result<(), HandlerError> {
        match self
            .sessions
            .source
            .delete(self.spec.resource_type, source_id)
            .await?
        {
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent => Ok(()),
            DeleteOutcome::InUse => Err(HandlerError::StillInUse(format!(
                "{} {source_id}",
                self.spec.resource_type
            ))),
        }
    }
}

type HandlerCtor = fn(SessionPair) -> Arc<dyn ResourceHandler>;

/// Fixed registration table: one constructor per resource type. A typo
/// here is a compile error; a mismatch between key and handler is caught
/// at startup by [`HandlerRegistry::new`].
const REGISTERED: [(ResourceType, HandlerCtor); 13] = [
    (ResourceType::Domain, keystone::domain),
    (ResourceType::Project, keystone::project),
    (ResourceType::User, keystone::user),
    (ResourceType::Role, keystone::role),
    (ResourceType::VolumeType, cinder::volume_type),
    (ResourceType::Volume, cinder::volume),
    (ResourceType::Network, neutron::network),
    (ResourceType::Subnet, neutron::subnet),
    (ResourceType::Port, neutron::port),
    (ResourceType::Image, glance::image),
    (ResourceType::Secret, barbican::secret),
    (ResourceType::ShareType, manila::share_type),
    (ResourceType::Share, manila::share),
];

/// Resolves resource types to handler instances. Instantiates every
/// registered type up front so mis-registrations surface at startup.
pub struct HandlerRegistry {
    handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new(sessions: &SessionPair) -> Self {
        let mut handlers = HashMap::with_capacity(REGISTERED.len());
        for (resource_type, ctor) in REGISTERED {
            let handler = ctor(sessions.clone());
            assert_eq!(
                handler.resource_type(),
                resource_type,
                "handler registered under the wrong resource type"
            );
            handlers.insert(resource_type, handler);
        }
        for resource_type in ResourceType::ALL {
            assert!(
                handlers.contains_key(&resource_type),
                "no handler registered for resource type {resource_type}"
            );
        }
        Self { handlers }
    }

    pub fn get(&self, resource_type: ResourceType) -> Arc<dyn ResourceHandler> {
        Arc::clone(
            self.handlers
                .get(&resource_type)
                .expect("registry is total over ResourceType"),
        )
    }

    /// Resolve by wire name; empty or unknown names are `InvalidInput`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ResourceHandler>, HandlerError> {
        if name.is_empty() {
            return Err(HandlerError::InvalidInput(
                "no resource type specified".to_string(),
            ));
        }
        let resource_type: ResourceType = name
            .parse()
            .map_err(|e: crate::resource::InvalidResourceType| {
                HandlerError::InvalidInput(e.to_string())
            })?;
        Ok(self.get(resource_type))
    }

    /// Every registered handler, for introspection (e.g. listing
    /// supported filters).
    pub fn all(&self) -> impl Iterator<Item = (ResourceType, &Arc<dyn ResourceHandler>)> {
        ResourceType::ALL
            .into_iter()
            .map(|rt| (rt, self.handlers.get(&rt).expect("registry is total")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake_sessions;
    use serde_json::json;

    #[tokio::test]
    async fn registry_covers_every_resource_type() {
        let (sessions, _source, _destination) = fake_sessions();
        let registry = HandlerRegistry::new(&sessions);
        for resource_type in ResourceType::ALL {
            assert_eq!(registry.get(resource_type).resource_type(), resource_type);
        }
    }

    #[tokio::test]
    async fn resolve_rejects_empty_and_unknown_names() {
        let (sessions, _source, _destination) = fake_sessions();
        let registry = HandlerRegistry::new(&sessions);
        assert!(matches!(
            registry.resolve("").map(|_| ()).unwrap_err(),
            HandlerError::InvalidInput(_)
        ));
        assert!(matches!(
            registry.resolve("mainframe").map(|_| ()).unwrap_err(),
            HandlerError::InvalidInput(_)
        ));
        assert_eq!(
            registry.resolve("volume-type").unwrap().resource_type(),
            ResourceType::VolumeType
        );
    }

    #[tokio::test]
    async fn migrate_one_creates_missing_destination_resource() {
        let (sessions, source, destination) = fake_sessions();
        source.seed(
            ResourceType::Domain,
            "d1",
            "engineering",
            json!({"description": "eng domain", "enabled": true}),
        );
        let registry = HandlerRegistry::new(&sessions);
        let handler = registry.get(ResourceType::Domain);

        let destination_id = handler.migrate_one("d1", &[]).await.unwrap();

        let created = destination.get_sync(ResourceType::Domain, &destination_id).unwrap();
        assert_eq!(created.name, "engineering");
        assert_eq!(created.attrs["description"], json!("eng domain"));
    }

    #[tokio::test]
    async fn migrate_one_reuses_existing_destination_resource() {
        let (sessions, source, destination) = fake_sessions();
        source.seed(ResourceType::Role, "r1", "admin", json!({}));
        destination.seed(ResourceType::Role, "dst-r1", "admin", json!({}));
        let registry = HandlerRegistry::new(&sessions);

        let destination_id = registry
            .get(ResourceType::Role)
            .migrate_one("r1", &[])
            .await
            .unwrap();
        assert_eq!(destination_id, "dst-r1");
        assert_eq!(destination.created_count(), 0);
    }

    #[tokio::test]
    async fn ambiguous_name_match_is_fatal() {
        let (sessions, source, destination) = fake_sessions();
        source.seed(ResourceType::Role, "r1", "admin", json!({}));
        destination.seed(ResourceType::Role, "dst-a", "admin", json!({}));
        destination.seed(ResourceType::Role, "dst-b", "admin", json!({}));
        let registry = HandlerRegistry::new(&sessions);

        let err = registry
            .get(ResourceType::Role)
            .migrate_one("r1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::MultipleResourcesFound { .. }));
    }

    #[tokio::test]
    async fn vanished_source_resource_is_not_found() {
        let (sessions, _source, _destination) = fake_sessions();
        let registry = HandlerRegistry::new(&sessions);
        let err = registry
            .get(ResourceType::Image)
            .migrate_one("ghost", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }

    #[tokio::test]
    async fn references_are_remapped_through_triples() {
        let (sessions, source, destination) = fake_sessions();
        source.seed(
            ResourceType::Project,
            "p1",
            "web",
            json!({"domain_id": "d1", "description": "web project"}),
        );
        let registry = HandlerRegistry::new(&sessions);
        let migrated = vec![MigratedResource {
            resource_type: ResourceType::Domain,
            source_id: "d1".to_string(),
            destination_id: "dst-d1".to_string(),
        }];

        let destination_id = registry
            .get(ResourceType::Project)
            .migrate_one("p1", &migrated)
            .await
            .unwrap();

        let created = destination
            .get_sync(ResourceType::Project, &destination_id)
            .unwrap();
        assert_eq!(created.attrs["domain_id"], json!("dst-d1"));
    }

    #[tokio::test]
    async fn unmapped_reference_blocks_migration() {
        let (sessions, source, destination) = fake_sessions();
        source.seed(
            ResourceType::Project,
            "p1",
            "web",
            json!({"domain_id": "d1"}),
        );
        let registry = HandlerRegistry::new(&sessions);

        let err = registry
            .get(ResourceType::Project)
            .migrate_one("p1", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::MissingDependency {
                resource_type: ResourceType::Domain,
                ..
            }
        ));
        // The handler must never attempt the create with a missing id.
        assert_eq!(destination.created_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_filter_key_is_invalid_input() {
        let (sessions, _source, _destination) = fake_sessions();
        let registry = HandlerRegistry::new(&sessions);
        let mut filters = BTreeMap::new();
        filters.insert("flavor".to_string(), "large".to_string());

        let err = registry
            .get(ResourceType::Domain)
            .source_resource_ids(&filters)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn source_ids_preserve_enumeration_order() {
        let (sessions, source, _destination) = fake_sessions();
        source.seed(ResourceType::VolumeType, "vt2", "slow", json!({}));
        source.seed(ResourceType::VolumeType, "vt1", "fast", json!({}));
        let registry = HandlerRegistry::new(&sessions);

        let ids = registry
            .get(ResourceType::VolumeType)
            .source_resource_ids(&BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(ids, vec!["vt2".to_string(), "vt1".to_string()]);
    }

    #[tokio::test]
    async fn delete_source_tolerates_absent_resource() {
        let (sessions, _source, _destination) = fake_sessions();
        let registry = HandlerRegistry::new(&sessions);
        registry
            .get(ResourceType::Network)
            .delete_source("never-existed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_source_reports_still_in_use() {
        let (sessions, source, _destination) = fake_sessions();
        source.seed(ResourceType::VolumeType, "vt1", "fast", json!({}));
        source.mark_in_use(ResourceType::VolumeType, "vt1");
        let registry = HandlerRegistry::new(&sessions);

        let err = registry
            .get(ResourceType::VolumeType)
            .delete_source("vt1")
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::StillInUse(_)));
        assert!(err.is_retryable());
    }
}
