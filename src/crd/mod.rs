//! Custom Resource Definitions for the organization registry
//!
//! Both kinds live in the `org.nddr.dev/v1alpha1` group and share the
//! property and status types in [`types`].

mod deployment;
mod managed;
mod organization;
mod types;

pub use deployment::{Deployment, DeploymentSpec};
pub use managed::{ManagedResource, ResourceKind};
pub use organization::{Organization, OrganizationSpec};
pub use types::{
    register_list, register_map, AddressAllocationStrategy, AdminState, Condition,
    ConditionStatus, DeletionPolicy, DeploymentPolicy, HealthStatus, LifecyclePolicy, OperState,
    Register, RegisterKind, RegisterMap, RegistryProperties, ResolvedStatus,
};
