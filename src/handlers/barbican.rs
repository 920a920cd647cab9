//! Barbican (secret) handler.
//!
//! Secrets deviate from the common shape in one way: the service reports
//! secret ids as hrefs, so deletion must use the trailing path segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::error::HandlerError;
use crate::resource::ResourceType;
use crate::session::{DeleteOutcome, SessionPair};
use crate::store::MigratedResource;

static SECRET: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Secret,
    fields: &[
        "algorithm",
        "bit_length",
        "content_types",
        "expires_at",
        "mode",
        "secret_type",
        "payload",
        "payload_content_type",
        "payload_content_encoding",
    ],
    refs: &[],
    filters: &[("owner_id", "owner")],
};

struct SecretHandler {
    inner: FieldMappedHandler,
    sessions: SessionPair,
}

fn secret_id_from_href(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}

#[async_trait]
impl ResourceHandler for SecretHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Secret
    }

    fn supported_filters(&self) -> Vec<&'static str> {
        self.inner.supported_filters()
    }

    async fn source_resource_ids(
        &self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, HandlerError> {
        self.inner.source_resource_ids(filters).await
    }

    async fn migrate_one(
        &self,
        source_id: &str,
        migrated: &[MigratedResource],
    ) -> Result<String, HandlerError> {
        self.inner.migrate_one(source_id, migrated).await
    }

    async fn delete_source(&self, source_id: &str) -> Result<(), HandlerError> {
        let secret_id = secret_id_from_href(source_id);
        match self
            .sessions
            .source
            .delete(ResourceType::Secret, secret_id)
            .await?
        {
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent => Ok(()),
            DeleteOutcome::InUse => Err(HandlerError::StillInUse(format!("secret {secret_id}"))),
        }
    }
}

pub fn secret(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(SecretHandler {
        inner: FieldMappedHandler::new(&SECRET, sessions.clone()),
        sessions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake_sessions;
    use serde_json::json;

    #[test]
    fn href_ids_are_reduced_to_their_last_segment() {
        assert_eq!(
            secret_id_from_href("https://barbican.example/v1/secrets/abc-123"),
            "abc-123"
        );
        assert_eq!(secret_id_from_href("abc-123"), "abc-123");
    }

    #[tokio::test]
    async fn delete_uses_parsed_secret_id() {
        let (sessions, source, _destination) = fake_sessions();
        source.seed(ResourceType::Secret, "abc-123", "db-password", json!({}));
        let handler = secret(sessions);

        handler
            .delete_source("https://barbican.example/v1/secrets/abc-123")
            .await
            .unwrap();
        assert!(source.get_sync(ResourceType::Secret, "abc-123").is_none());
    }
}
