//! Resource type catalog and the type-level dependency graph.
//!
//! The set of migratable resource types is fixed at compile time. Each
//! type knows its owning service and the resource types it may reference,
//! which drives both batch ordering and the dependency triples handed to
//! handlers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of cloud object handled by exactly one registered handler.
///
/// Wire names (kebab-case) are used in the CLI, the database and log
/// output, e.g. `volume-type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceType {
    Domain,
    Project,
    User,
    Role,
    VolumeType,
    Volume,
    Network,
    Subnet,
    Port,
    Image,
    Secret,
    ShareType,
    Share,
}

impl ResourceType {
    /// Every supported resource type, in a stable order used for
    /// deterministic tie-breaking when scheduling batches.
    pub const ALL: [ResourceType; 13] = [
        Self::Domain,
        Self::Project,
        Self::User,
        Self::Role,
        Self::VolumeType,
        Self::Volume,
        Self::Network,
        Self::Subnet,
        Self::Port,
        Self::Image,
        Self::Secret,
        Self::ShareType,
        Self::Share,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Project => "project",
            Self::User => "user",
            Self::Role => "role",
            Self::VolumeType => "volume-type",
            Self::Volume => "volume",
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::Port => "port",
            Self::Image => "image",
            Self::Secret => "secret",
            Self::ShareType => "share-type",
            Self::Share => "share",
        }
    }

    /// The service owning this resource type, used for filtering and
    /// logging.
    pub fn service(self) -> &'static str {
        match self {
            Self::Domain | Self::Project | Self::User | Self::Role => "keystone",
            Self::VolumeType | Self::Volume => "cinder",
            Self::Network | Self::Subnet | Self::Port => "neutron",
            Self::Image => "glance",
            Self::Secret => "barbican",
            Self::ShareType | Self::Share => "manila",
        }
    }

    /// Resource types whose destination ids must exist before an instance
    /// of this type can be migrated.
    pub fn dependencies(self) -> &'static [ResourceType] {
        match self {
            Self::Domain | Self::VolumeType | Self::ShareType => &[],
            Self::Project => &[Self::Domain],
            Self::User => &[Self::Domain, Self::Project],
            Self::Role => &[Self::Domain],
            Self::Volume => &[Self::VolumeType, Self::Project],
            Self::Network => &[Self::Project],
            Self::Subnet => &[Self::Network, Self::Project],
            Self::Port => &[Self::Network, Self::Subnet, Self::Project],
            Self::Image => &[Self::Project],
            Self::Secret => &[Self::Project],
            Self::Share => &[Self::ShareType, Self::Project],
        }
    }

    /// Resource types that may reference an instance of this type.
    pub fn dependents(self) -> Vec<ResourceType> {
        Self::ALL
            .into_iter()
            .filter(|other| other.dependencies().contains(&self))
            .collect()
    }

    pub fn has_dependents(self) -> bool {
        Self::ALL.iter().any(|other| other.dependencies().contains(&self))
    }

    /// Transitive closure of [`dependencies`](Self::dependencies), the set
    /// of types whose migrated records are relevant when migrating an
    /// instance of this type.
    pub fn dependency_closure(self) -> Vec<ResourceType> {
        let mut closure = Vec::new();
        let mut pending = self.dependencies().to_vec();
        while let Some(dep) = pending.pop() {
            if !closure.contains(&dep) {
                closure.push(dep);
                pending.extend_from_slice(dep.dependencies());
            }
        }
        closure.sort();
        closure
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unsupported resource type: {0}")]
pub struct InvalidResourceType(pub String);

impl FromStr for ResourceType {
    type Err = InvalidResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rt| rt.name() == s)
            .ok_or_else(|| InvalidResourceType(s.to_string()))
    }
}

impl TryFrom<String> for ResourceType {
    type Error = InvalidResourceType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceType> for String {
    fn from(rt: ResourceType) -> Self {
        rt.name().to_string()
    }
}
