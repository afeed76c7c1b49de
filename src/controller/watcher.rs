//! Organization → Deployment fan-out
//!
//! Any change to an Organization requeues every Deployment in its namespace.
//! Matching on the encoded organization segment is left to the Deployment
//! update, which sorts out unrelated deployments cheaply.

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use crate::crd::{Deployment, Organization};

/// Deployments to requeue after a change to `organization`
pub fn deployments_for_organization(
    organization: &Organization,
    deployments: &[Arc<Deployment>],
) -> Vec<ObjectRef<Deployment>> {
    let Some(namespace) = organization.namespace() else {
        return Vec::new();
    };
    deployments
        .iter()
        .filter(|dep| dep.namespace().as_deref() == Some(namespace.as_str()))
        .map(|dep| ObjectRef::from_obj(dep.as_ref()))
        .collect()
}
