//! Glance (image) handler.
//!
//! Only image metadata is mapped here; the byte-level payload move is
//! the storage backend's concern, outside the orchestrator.

use std::sync::Arc;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::resource::ResourceType;
use crate::session::SessionPair;

static IMAGE: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Image,
    fields: &[
        "container_format",
        "disk_format",
        "min_disk",
        "min_ram",
        "visibility",
        "protected",
        "tags",
    ],
    refs: &[("owner_id", ResourceType::Project)],
    filters: &[("owner_id", "owner")],
};

pub fn image(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&IMAGE, sessions))
}
