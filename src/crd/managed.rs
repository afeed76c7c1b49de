//! Capability interface shared by the Organization and Deployment resources
//!
//! The reconciliation engine is written once against [`ManagedResource`];
//! each CRD only says where its properties and status live.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    register_list, register_map, AddressAllocationStrategy, AdminState, LifecyclePolicy,
    OperState, RegisterMap, RegistryProperties, ResolvedStatus,
};

/// The two resource kinds of the hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Root of the hierarchy
    Organization,
    /// Child of an organization
    Deployment,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Organization => write!(f, "Organization"),
            Self::Deployment => write!(f, "Deployment"),
        }
    }
}

/// A namespaced resource with register properties and a resolved-state block
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Kind of the resource
    const KIND: ResourceKind;

    /// Desired-state properties
    fn properties(&self) -> &RegistryProperties;

    /// Lifecycle policy
    fn lifecycle(&self) -> &LifecyclePolicy;

    /// Resolved-state block, if allocated
    fn state(&self) -> Option<&ResolvedStatus>;

    /// Mutable access to the resolved-state block
    fn state_mut(&mut self) -> &mut Option<ResolvedStatus>;

    /// Allocate an empty resolved-state block when absent.
    ///
    /// Returns true if a block was allocated. An existing block is never
    /// touched, so a spec-only update cannot wipe resolved state.
    fn initialize_state(&mut self) -> bool {
        if self.state().is_some() {
            return false;
        }
        *self.state_mut() = Some(ResolvedStatus::default());
        true
    }

    /// Explicit register bindings from the spec
    fn register(&self) -> RegisterMap {
        register_map(&self.properties().register)
    }

    /// Allocation strategy from the spec; an empty value counts as unset
    fn allocation_strategy(&self) -> Option<AddressAllocationStrategy> {
        self.properties()
            .address_allocation_strategy
            .clone()
            .filter(|s| !s.is_empty())
    }

    /// Administrative state, enabled when unset
    fn admin_state(&self) -> AdminState {
        self.properties().admin_state.clone().unwrap_or_default()
    }

    /// Resolved register bindings; empty before first resolution
    fn resolved_register(&self) -> RegisterMap {
        self.state().map(|s| s.register()).unwrap_or_default()
    }

    /// Replace the resolved register bindings
    fn set_resolved_register(&mut self, register: &RegisterMap) {
        state_block(self).resolved_register = register_list(register);
    }

    /// Resolved allocation strategy
    fn resolved_allocation_strategy(&self) -> Option<AddressAllocationStrategy> {
        self.state()
            .and_then(|s| s.resolved_address_allocation_strategy.clone())
    }

    /// Replace the resolved allocation strategy
    fn set_resolved_allocation_strategy(&mut self, strategy: Option<AddressAllocationStrategy>) {
        state_block(self).resolved_address_allocation_strategy = strategy;
    }

    /// Operational status; unknown before first resolution
    fn status(&self) -> OperState {
        self.state().map(|s| s.status).unwrap_or_default()
    }

    /// Reason attached to the current status
    fn reason(&self) -> &str {
        self.state().map(|s| s.reason.as_str()).unwrap_or_default()
    }

    /// Set status and reason together
    fn set_status(&mut self, status: OperState, reason: &str) {
        let block = state_block(self);
        block.status = status;
        block.reason = reason.to_string();
    }

    /// Mark the resource down and drop whatever it had resolved before
    fn mark_down(&mut self, reason: &str) {
        let block = state_block(self);
        block.resolved_register.clear();
        block.resolved_address_allocation_strategy = None;
        block.status = OperState::Down;
        block.reason = reason.to_string();
    }
}

fn state_block<K: ManagedResource>(resource: &mut K) -> &mut ResolvedStatus {
    resource.state_mut().get_or_insert_with(ResolvedStatus::default)
}
