//! Organization application
//!
//! An Organization is the root of the hierarchy: it owns a namespace and
//! resolves to its own register bindings without validation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{begin_pass, Application, AttemptTracker, Labels, ResourceId, TimeoutPolicy};
use super::ADMIN_STATE_DISABLED;
use crate::crd::{AdminState, DeletionPolicy, ManagedResource, OperState, Organization};
use crate::inheritance::resolve_root;
use crate::namespace::NamespaceProvisioner;
use crate::Error;

/// Reconciliation logic for Organizations
pub struct OrganizationApp {
    namespaces: Arc<dyn NamespaceProvisioner>,
    attempts: Arc<AttemptTracker>,
    policy: TimeoutPolicy,
}

impl OrganizationApp {
    /// Create the application
    pub fn new(
        namespaces: Arc<dyn NamespaceProvisioner>,
        attempts: Arc<AttemptTracker>,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            namespaces,
            attempts,
            policy,
        }
    }

    /// Attempt counters of this application
    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }
}

#[async_trait]
impl Application for OrganizationApp {
    type Resource = Organization;

    async fn update(&self, org: &mut Organization) -> Result<Labels, Error> {
        let id = ResourceId::of(org)?;
        begin_pass(&self.attempts, &id, org);

        if org.admin_state() == AdminState::Disable {
            debug!(organization = %id, "administratively disabled");
            org.mark_down(ADMIN_STATE_DISABLED);
            return Ok(Labels::new());
        }

        self.namespaces.ensure_namespace(org).await?;

        let resolution = resolve_root(&org.register(), org.allocation_strategy().as_ref());
        org.set_resolved_register(&resolution.register);
        org.set_resolved_allocation_strategy(resolution.strategy);
        org.set_status(OperState::Up, "");
        Ok(Labels::new())
    }

    fn timeout(&self, org: &Organization) -> Duration {
        match ResourceId::of(org) {
            Ok(id) => self.policy.next(&self.attempts, &id),
            Err(_) => super::RECONCILE_PERIOD,
        }
    }

    async fn delete(&self, org: &Organization) -> Result<bool, Error> {
        if org.lifecycle().deletion_policy == DeletionPolicy::Orphan {
            info!(organization = %org.name_any(), "orphaning organization namespace");
            return Ok(true);
        }
        self.namespaces.delete_namespace(org).await?;
        Ok(true)
    }

    fn final_delete(&self, org: &Organization) {
        if let Ok(id) = ResourceId::of(org) {
            self.attempts.delete(&id);
        }
    }
}
