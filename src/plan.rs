//! Dependency resolution: orders resource type batches so every type
//! that can appear as a dependency is migrated strictly before its
//! dependents.
//!
//! The type-level graph is static configuration ([`ResourceType`]
//! declares its own edges), so cycle detection runs once at startup and
//! fails fast instead of surfacing mid-run.

use std::collections::HashMap;

use crate::error::PlanError;
use crate::resource::ResourceType;

/// Verify the declared type-level graph is acyclic. Called at startup;
/// a cycle is a configuration error, never a runtime condition.
pub fn validate_graph() -> Result<(), PlanError> {
    order_types(&ResourceType::ALL).map(|_| ())
}

/// Topological order over the requested types (Kahn's algorithm). Edges
/// to types outside the requested set are ignored: their instances are
/// either already migrated (their records supply the dependency triples)
/// or absent, in which case dependents fail with a blocked-by-dependency
/// cause. Ties are broken by the fixed [`ResourceType::ALL`] order so
/// repeated runs are reproducible.
pub fn order_types(requested: &[ResourceType]) -> Result<Vec<ResourceType>, PlanError> {
    let mut in_degree: HashMap<ResourceType, usize> = HashMap::new();
    for &rt in requested {
        let degree = rt
            .dependencies()
            .iter()
            .filter(|dep| requested.contains(dep))
            .count();
        in_degree.insert(rt, degree);
    }

    let mut ordered = Vec::with_capacity(in_degree.len());
    while ordered.len() < in_degree.len() {
        // Deterministic pick: first ready type in catalog order.
        let next = ResourceType::ALL.into_iter().find(|rt| {
            in_degree.get(rt) == Some(&0) && !ordered.contains(rt)
        });
        let Some(next) = next else {
            // Every remaining type still has unmet in-run dependencies.
            let stuck = ResourceType::ALL
                .into_iter()
                .find(|rt| in_degree.contains_key(rt) && !ordered.contains(rt))
                .expect("non-empty remainder when ordering stalls");
            return Err(PlanError::DependencyCycle(stuck));
        };
        ordered.push(next);
        for (&rt, degree) in &mut in_degree {
            if rt.dependencies().contains(&next) && requested.contains(&next) {
                *degree = degree.saturating_sub(1);
            }
        }
    }
    Ok(ordered)
}
