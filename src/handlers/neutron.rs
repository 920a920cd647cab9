//! Neutron (networking) handlers: networks, subnets, ports.

use std::sync::Arc;

use super::{FieldMappedHandler, HandlerSpec, ResourceHandler};
use crate::resource::ResourceType;
use crate::session::SessionPair;

static NETWORK: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Network,
    fields: &["description", "is_admin_state_up", "shared", "mtu"],
    refs: &[("project_id", ResourceType::Project)],
    filters: &[("project_id", "project_id")],
};

static SUBNET: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Subnet,
    fields: &[
        "description",
        "ip_version",
        "cidr",
        "gateway_ip",
        "enable_dhcp",
        "allocation_pools",
        "dns_nameservers",
    ],
    refs: &[
        ("network_id", ResourceType::Network),
        ("project_id", ResourceType::Project),
    ],
    filters: &[("network_id", "network_id"), ("project_id", "project_id")],
};

static PORT: HandlerSpec = HandlerSpec {
    resource_type: ResourceType::Port,
    fields: &["description", "is_admin_state_up", "device_owner"],
    refs: &[
        ("network_id", ResourceType::Network),
        ("project_id", ResourceType::Project),
    ],
    filters: &[("network_id", "network_id")],
};

pub fn network(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&NETWORK, sessions))
}

pub fn subnet(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&SUBNET, sessions))
}

pub fn port(sessions: SessionPair) -> Arc<dyn ResourceHandler> {
    Arc::new(FieldMappedHandler::new(&PORT, sessions))
}
