//! In-memory test doubles shared across unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::handlers::HandlerRegistry;
use crate::manager::{MigrationManager, RunSettings};
use crate::resource::ResourceType;
use crate::session::{CloudSession, DeleteOutcome, Resource, SessionError, SessionPair};
use crate::store::MigrationStore;

#[derive(Default)]
struct FakeState {
    resources: HashMap<ResourceType, Vec<Resource>>,
    in_use: HashSet<(ResourceType, String)>,
    failing_creates: HashSet<ResourceType>,
    create_delay: Option<std::time::Duration>,
    created: usize,
}

/// In-memory [`CloudSession`] with seeding and failure injection.
#[derive(Default)]
pub(crate) struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    pub(crate) fn seed(&self, kind: ResourceType, id: &str, name: &str, attrs: Value) {
        self.state
            .lock()
            .unwrap()
            .resources
            .entry(kind)
            .or_default()
            .push(Resource::new(id, name, attrs));
    }

    /// Synchronous lookup for assertions.
    pub(crate) fn get_sync(&self, kind: ResourceType, id: &str) -> Option<Resource> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&kind)
            .and_then(|list| list.iter().find(|r| r.id == id))
            .cloned()
    }

    /// How many resources `create` has produced, across all kinds.
    pub(crate) fn created_count(&self) -> usize {
        self.state.lock().unwrap().created
    }

    /// Make deletes of this resource report a conflict.
    pub(crate) fn mark_in_use(&self, kind: ResourceType, id: &str) {
        self.state
            .lock()
            .unwrap()
            .in_use
            .insert((kind, id.to_string()));
    }

    /// Undo [`mark_in_use`](Self::mark_in_use).
    pub(crate) fn clear_in_use(&self, kind: ResourceType, id: &str) {
        self.state
            .lock()
            .unwrap()
            .in_use
            .remove(&(kind, id.to_string()));
    }

    /// Make every create stall for this long before responding.
    pub(crate) fn delay_creates(&self, delay: std::time::Duration) {
        self.state.lock().unwrap().create_delay = Some(delay);
    }

    /// Make every create of this kind fail with a server error.
    pub(crate) fn fail_creates(&self, kind: ResourceType) {
        self.state.lock().unwrap().failing_creates.insert(kind);
    }

    /// Undo [`fail_creates`](Self::fail_creates).
    pub(crate) fn heal(&self, kind: ResourceType) {
        self.state.lock().unwrap().failing_creates.remove(&kind);
    }
}

#[async_trait]
impl CloudSession for FakeCloud {
    async fn get(&self, kind: ResourceType, id: &str) -> Result<Option<Resource>, SessionError> {
        Ok(self.get_sync(kind, id))
    }

    async fn find_by_name(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Vec<Resource>, SessionError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .resources
            .get(&kind)
            .map(|list| list.iter().filter(|r| r.name == name).cloned().collect())
            .unwrap_or_default())
    }

    async fn list(
        &self,
        kind: ResourceType,
        query: &[(String, String)],
    ) -> Result<Vec<Resource>, SessionError> {
        let state = self.state.lock().unwrap();
        let matches = |r: &Resource| {
            query.iter().all(|(key, value)| {
                if key == "name" {
                    r.name == *value
                } else {
                    r.attr_str(key) == Some(value.as_str())
                }
            })
        };
        Ok(state
            .resources
            .get(&kind)
            .map(|list| list.iter().filter(|r| matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, kind: ResourceType, body: Value) -> Result<Resource, SessionError> {
        // Read the delay first; the lock must not be held across an await.
        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_creates.contains(&kind) {
            return Err(SessionError::Api {
                status: 500,
                message: "injected create failure".to_string(),
            });
        }
        state.created += 1;
        let id = format!("dst-{}", state.created);
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let resource = Resource::new(id, name, body);
        state
            .resources
            .entry(kind)
            .or_default()
            .push(resource.clone());
        Ok(resource)
    }

    async fn delete(&self, kind: ResourceType, id: &str) -> Result<DeleteOutcome, SessionError> {
        let mut state = self.state.lock().unwrap();
        if state.in_use.contains(&(kind, id.to_string())) {
            return Ok(DeleteOutcome::InUse);
        }
        let Some(list) = state.resources.get_mut(&kind) else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        if list.len() == before {
            Ok(DeleteOutcome::AlreadyAbsent)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }
}

/// A session pair backed by two fresh fakes, returned alongside handles
/// to each so tests can seed and inspect them.
pub(crate) fn fake_sessions() -> (SessionPair, Arc<FakeCloud>, Arc<FakeCloud>) {
    let source = Arc::new(FakeCloud::default());
    let destination = Arc::new(FakeCloud::default());
    let sessions = SessionPair::new(
        Arc::clone(&source) as Arc<dyn CloudSession>,
        Arc::clone(&destination) as Arc<dyn CloudSession>,
    );
    (sessions, source, destination)
}

/// A full manager over an in-memory store and fake clouds.
pub(crate) async fn manager_with_fakes() -> (MigrationManager, Arc<FakeCloud>, Arc<FakeCloud>) {
    let (sessions, source, destination) = fake_sessions();
    let store = MigrationStore::in_memory()
        .await
        .expect("in-memory store opens");
    let registry = HandlerRegistry::new(&sessions);
    let manager = MigrationManager::new(store, registry, RunSettings::default())
        .expect("dependency graph is acyclic");
    (manager, source, destination)
}
