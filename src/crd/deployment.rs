//! Deployment Custom Resource Definition
//!
//! A Deployment belongs to exactly one Organization. The organization is not
//! referenced by a field: it is encoded in the resource name as
//! `<organization>.<deployment>` and recovered with [`HierarchicalName`].

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::managed::{ManagedResource, ResourceKind};
use super::types::{LifecyclePolicy, RegistryProperties, ResolvedStatus};
use crate::identity::HierarchicalName;

/// Specification for a Deployment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.nddr.dev",
    version = "v1alpha1",
    kind = "Deployment",
    plural = "deployments",
    shortname = "dep",
    status = "ResolvedStatus",
    namespaced,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Register bindings, admin state and allocation strategy
    #[serde(flatten)]
    pub properties: RegistryProperties,

    /// Deployment kind (e.g. edge, core)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Region the deployment runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Lifecycle policy
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
}

impl Deployment {
    /// Decode the organization/deployment pair from the resource name
    pub fn hierarchical_name(&self) -> Result<HierarchicalName, crate::Error> {
        HierarchicalName::parse(&self.name_any())
    }
}

impl ManagedResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn properties(&self) -> &RegistryProperties {
        &self.spec.properties
    }

    fn lifecycle(&self) -> &LifecyclePolicy {
        &self.spec.lifecycle
    }

    fn state(&self) -> Option<&ResolvedStatus> {
        self.status.as_ref()
    }

    fn state_mut(&mut self) -> &mut Option<ResolvedStatus> {
        &mut self.status
    }
}
