//! Pre-authenticated cloud session boundary.
//!
//! Handlers talk to the source and destination clouds exclusively through
//! [`CloudSession`], a small generic resource API. The orchestrator never
//! touches sessions itself; it only passes the pair down to handlers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::resource::ResourceType;

/// A cloud resource as seen by handlers: an id, a natural-key name and
/// the remaining attributes as loose JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub attrs: Value,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, attrs: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attrs,
        }
    }

    /// String attribute lookup, treating missing and null as absent.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// Outcome of a source-side delete. Already-absent resources are not an
/// error; still-referenced ones are reported so cleanup can retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    InUse,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed remote response: {0}")]
    Malformed(String),
}

/// Generic resource operations against one cloud. Implementations are
/// handed in pre-authenticated; nothing here deals with credentials.
#[async_trait]
pub trait CloudSession: Send + Sync {
    async fn get(&self, kind: ResourceType, id: &str) -> Result<Option<Resource>, SessionError>;

    /// All resources of `kind` whose name matches exactly. More than one
    /// match is possible (names are not unique in every service).
    async fn find_by_name(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Vec<Resource>, SessionError>;

    async fn list(
        &self,
        kind: ResourceType,
        query: &[(String, String)],
    ) -> Result<Vec<Resource>, SessionError>;

    async fn create(&self, kind: ResourceType, body: Value) -> Result<Resource, SessionError>;

    async fn delete(&self, kind: ResourceType, id: &str) -> Result<DeleteOutcome, SessionError>;
}

/// The two session objects every handler receives: one per cloud.
#[derive(Clone)]
pub struct SessionPair {
    pub source: Arc<dyn CloudSession>,
    pub destination: Arc<dyn CloudSession>,
}

impl SessionPair {
    pub fn new(source: Arc<dyn CloudSession>, destination: Arc<dyn CloudSession>) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl fmt::Debug for SessionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPair").finish_non_exhaustive()
    }
}

/// REST-backed [`CloudSession`] speaking a uniform resource API rooted at
/// a base endpoint: `GET|POST /{kind}s`, `GET|DELETE /{kind}s/{id}`.
///
/// 404 on delete maps to [`DeleteOutcome::AlreadyAbsent`] and 409 to
/// [`DeleteOutcome::InUse`], mirroring how the services report a resource
/// that is gone versus still referenced.
pub struct HttpCloudSession {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct WireResource {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    attrs: Value,
}

impl From<WireResource> for Resource {
    fn from(wire: WireResource) -> Self {
        Resource {
            id: wire.id,
            name: wire.name,
            attrs: wire.attrs,
        }
    }
}

impl HttpCloudSession {
    pub fn new(endpoint: Url, token: String, timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            token,
            timeout,
        })
    }

    /// Timed-out calls carry the configured per-request timeout.
    fn wire_err(&self, err: reqwest::Error) -> SessionError {
        if err.is_timeout() {
            SessionError::Timeout(self.timeout)
        } else {
            SessionError::Transport(err.to_string())
        }
    }

    fn collection_url(&self, kind: ResourceType) -> Result<Url, SessionError> {
        self.endpoint
            .join(&format!("{}s/", kind.name()))
            .map_err(|e| SessionError::Malformed(e.to_string()))
    }

    fn resource_url(&self, kind: ResourceType, id: &str) -> Result<Url, SessionError> {
        self.collection_url(kind)?
            .join(id)
            .map_err(|e| SessionError::Malformed(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SessionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SessionError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CloudSession for HttpCloudSession {
    async fn get(&self, kind: ResourceType, id: &str) -> Result<Option<Resource>, SessionError> {
        let response = self
            .client
            .get(self.resource_url(kind, id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.wire_err(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let wire: WireResource = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.wire_err(e))?;
        Ok(Some(wire.into()))
    }

    async fn find_by_name(
        &self,
        kind: ResourceType,
        name: &str,
    ) -> Result<Vec<Resource>, SessionError> {
        self.list(kind, &[("name".to_string(), name.to_string())])
            .await
    }

    async fn list(
        &self,
        kind: ResourceType,
        query: &[(String, String)],
    ) -> Result<Vec<Resource>, SessionError> {
        let response = self
            .client
            .get(self.collection_url(kind)?)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.wire_err(e))?;
        let wire: Vec<WireResource> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.wire_err(e))?;
        Ok(wire.into_iter().map(Resource::from).collect())
    }

    async fn create(&self, kind: ResourceType, body: Value) -> Result<Resource, SessionError> {
        let response = self
            .client
            .post(self.collection_url(kind)?)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.wire_err(e))?;
        let wire: WireResource = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.wire_err(e))?;
        Ok(wire.into())
    }

    async fn delete(&self, kind: ResourceType, id: &str) -> Result<DeleteOutcome, SessionError> {
        let response = self
            .client
            .delete(self.resource_url(kind, id)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.wire_err(e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            StatusCode::CONFLICT => Ok(DeleteOutcome::InUse),
            _ => {
                Self::check(response).await?;
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attr_str_treats_null_as_absent() {
        let resource = Resource::new("r1", "thing", json!({"a": "x", "b": null}));
        assert_eq!(resource.attr_str("a"), Some("x"));
        assert_eq!(resource.attr_str("b"), None);
        assert_eq!(resource.attr_str("missing"), None);
    }

    #[test]
    fn timeout_error_reports_the_configured_duration() {
        let err = SessionError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "remote call timed out after 30s");
    }

    #[test]
    fn wire_resource_flattens_extra_attrs() {
        let wire: WireResource = serde_json::from_value(json!({
            "id": "v1",
            "name": "fast",
            "is_public": true,
            "description": "ssd"
        }))
        .unwrap();
        let resource: Resource = wire.into();
        assert_eq!(resource.id, "v1");
        assert_eq!(resource.name, "fast");
        assert_eq!(resource.attrs["is_public"], json!(true));
    }
}
