//! Organization Custom Resource Definition
//!
//! An Organization is the root of the register hierarchy. Its own register
//! bindings and allocation strategy become the defaults every Deployment of
//! the organization inherits.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::managed::{ManagedResource, ResourceKind};
use super::types::{LifecyclePolicy, RegistryProperties, ResolvedStatus};

/// Specification for an Organization
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "org.nddr.dev",
    version = "v1alpha1",
    kind = "Organization",
    plural = "organizations",
    shortname = "org",
    status = "ResolvedStatus",
    namespaced,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    /// Register bindings, admin state and allocation strategy
    #[serde(flatten)]
    pub properties: RegistryProperties,

    /// Lifecycle policy
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
}

impl ManagedResource for Organization {
    const KIND: ResourceKind = ResourceKind::Organization;

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
