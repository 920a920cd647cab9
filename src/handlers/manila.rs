//! Manila (shared filesystem) handlers: share types and shares.

use std::sync::Arc;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::resource::ResourceType;
use crate::session::SessionPair;

static SHARE_TYPE: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::ShareType,
    fields: &["description", "is_public", "extra_specs"],
    refs: &[],
    filters: &[],
};

static SHARE: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Share,
    fields: &["description", "size", "share_proto", "metadata"],
    refs: &[
        ("share_type_id", ResourceType::ShareType),
        ("project_id", ResourceType::Project),
    ],
    filters: &[("project_id", "project_id")],
};

pub fn share_type(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&SHARE_TYPE, sessions))
}

pub fn share(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&SHARE, sessions))
}
