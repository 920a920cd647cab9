//! Cinder (block storage) handlers: volume types and volumes.
//!
//! The orchestrator does not move volume payloads; a volume migration
//! creates the destination volume and the storage backend handles the
//! data path.

use std::sync::Arc;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::resource::ResourceType;
use crate::session::SessionPair;

static VOLUME_TYPE: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::VolumeType,
    fields: &["description", "is_public", "extra_specs"],
    refs: &[],
    filters: &[],
};

static VOLUME: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Volume,
    fields: &["description", "size", "bootable", "metadata"],
    refs: &[
        ("volume_type_id", ResourceType::VolumeType),
        ("project_id", ResourceType::Project),
    ],
    filters: &[("project_id", "project_id")],
};

pub fn volume_type(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&VOLUME_TYPE, sessions))
}

pub fn volume(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&VOLUME, sessions))
}
