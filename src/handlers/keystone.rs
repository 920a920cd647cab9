//! Keystone (identity) handlers: domains, projects, users, roles.

use std::sync::Arc;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::resource::ResourceType;
use crate::session::SessionPair;

static DOMAIN: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Domain,
    fields: &["description", "enabled"],
    refs: &[],
    filters: &[],
};

static PROJECT: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Project,
    fields: &["description", "enabled", "is_domain", "tags"],
    refs: &[("domain_id", ResourceType::Domain)],
    filters: &[("domain_id", "domain_id")],
};

static USER: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::User,
    fields: &["description", "email", "enabled"],
    refs: &[
        ("domain_id", ResourceType::Domain),
        ("default_project_id", ResourceType::Project),
    ],
    filters: &[("domain_id", "domain_id")],
};

static ROLE: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Role,
    fields: &["description"],
    refs: &[("domain_id", ResourceType::Domain)],
    filters: &[],
};

pub fn domain(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&DOMAIN, sessions))
}

pub fn project(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&PROJECT, sessions))
}

pub fn user(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&USER, sessions))
}

pub fn role(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&ROLE, sessions))
}
