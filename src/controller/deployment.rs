//! Deployment application
//!
//! A Deployment inherits from the Organization encoded in its name. The
//! parent's resolved state is the source of inheritance, so a Deployment only
//! converges after its Organization has.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, warn};

use super::{begin_pass, Application, AttemptTracker, Labels, ResourceId, TimeoutPolicy};
use super::{ADMIN_STATE_DISABLED, RECONCILE_PERIOD};
use crate::crd::{AdminState, Deployment, ManagedResource, OperState};
use crate::inheritance::resolve;
use crate::store::ResourceStore;
use crate::Error;

/// Reason recorded when the parent Organization does not exist
pub const ORGANIZATION_NOT_FOUND: &str = "organization not found";

/// Label carrying the owning organization of a Deployment
pub const ORGANIZATION_LABEL: &str = "org.nddr.dev/organization";

/// Reconciliation logic for Deployments
pub struct DeploymentApp {
    store: Arc<dyn ResourceStore>,
    attempts: Arc<AttemptTracker>,
    policy: TimeoutPolicy,
}

impl DeploymentApp {
    /// Create the application
    pub fn new(
        store: Arc<dyn ResourceStore>,
        attempts: Arc<AttemptTracker>,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            store,
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
impl Application for DeploymentApp {
    type Resource = Deployment;

    async fn update(&self, dep: &mut Deployment) -> Result<Labels, Error> {
        let id = ResourceId::of(dep)?;
        begin_pass(&self.attempts, &id, dep);

        if dep.admin_state() == AdminState::Disable {
            debug!(deployment = %id, "administratively disabled");
            dep.mark_down(ADMIN_STATE_DISABLED);
            return Ok(Labels::new());
        }

        let name = match dep.hierarchical_name() {
            Ok(name) if name.is_deployment() => name,
            Ok(_) => {
                let e = Error::validation(
                    dep.name_any(),
                    "deployment name must be <organization>.<deployment>",
                );
                dep.mark_down(&e.to_string());
                return Err(e);
            }
            Err(e) => {
                dep.mark_down(&e.to_string());
                return Err(e);
            }
        };

        let organizations = self.store.list_organizations(&id.namespace).await?;
        let Some(org) = organizations
            .iter()
            .find(|org| org.name_any() == name.organization())
        else {
            warn!(deployment = %id, organization = name.organization(), "parent organization missing");
            dep.mark_down(ORGANIZATION_NOT_FOUND);
            return Err(Error::not_found(
                "Organization",
                &id.namespace,
                name.organization(),
            ));
        };

        let resolution = match resolve(
            &dep.register(),
            dep.allocation_strategy().as_ref(),
            &org.resolved_register(),
            org.resolved_allocation_strategy().as_ref(),
        ) {
            Ok(resolution) => resolution,
            Err(e) => {
                dep.mark_down(&e.to_string());
                return Err(e);
            }
        };

        dep.set_resolved_register(&resolution.register);
        dep.set_resolved_allocation_strategy(resolution.strategy);
        dep.set_status(OperState::Up, "");

        Ok(Labels::from([(
            ORGANIZATION_LABEL.to_string(),
            name.organization().to_string(),
        )]))
    }

    fn timeout(&self, dep: &Deployment) -> Duration {
        match ResourceId::of(dep) {
            Ok(id) => self.policy.next(&self.attempts, &id),
            Err(_) => RECONCILE_PERIOD,
        }
    }

    async fn delete(&self, _dep: &Deployment) -> Result<bool, Error> {
        Ok(true)
    }

    fn final_delete(&self, dep: &Deployment) {
        if let Ok(id) = ResourceId::of(dep) {
            self.attempts.delete(&id);
        }
    }
}
