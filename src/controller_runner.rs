//! Controller runner - builds the Organization and Deployment controllers
//!
//! Each `build_*` function returns boxed futures the binary joins, keeping
//! controller construction separate from process setup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::controller::{
    deployments_for_organization, error_policy, reconcile, AttemptTracker, Context,
    DeploymentApp, OrganizationApp, TimeoutPolicy,
};
use crate::crd::{Deployment, Organization};
use crate::namespace::KubeNamespaceProvisioner;
use crate::store::{KubeStore, ResourceStore};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Settings shared by both controllers
#[derive(Clone, Debug)]
pub struct RunnerSettings {
    /// Requeue policy after a successful pass
    pub timeout_policy: TimeoutPolicy,
    /// Deadline for a single pass
    pub pass_deadline: Duration,
}

/// Build the Organization and Deployment controllers
pub fn build_controllers(client: Client, settings: RunnerSettings) -> Vec<ControllerFuture> {
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));

    let org_app = OrganizationApp::new(
        Arc::new(KubeNamespaceProvisioner::new(client.clone())),
        Arc::new(AttemptTracker::new()),
        settings.timeout_policy.clone(),
    );
    let org_ctx =
        Arc::new(Context::new(org_app, store.clone()).with_deadline(settings.pass_deadline));

    let dep_app = DeploymentApp::new(
        store.clone(),
        Arc::new(AttemptTracker::new()),
        settings.timeout_policy,
    );
    let dep_ctx = Arc::new(Context::new(dep_app, store).with_deadline(settings.pass_deadline));

    let organizations: Api<Organization> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client.clone());

    let org_ctrl = Controller::new(
        organizations.clone(),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(
        reconcile::<OrganizationApp>,
        error_policy::<OrganizationApp>,
        org_ctx,
    )
    .for_each(log_reconcile_result("Organization"));

    let dep_controller = Controller::new(
        deployments,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let known_deployments = dep_controller.store();
    let dep_ctrl = dep_controller
        .watches(
            organizations,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
            move |org| {
                let affected = deployments_for_organization(&org, &known_deployments.state());
                tracing::debug!(
                    organization = ?org.metadata.name,
                    affected_count = affected.len(),
                    "Triggering re-reconciliation of deployments"
                );
                affected
            },
        )
        .shutdown_on_signal()
        .run(
            reconcile::<DeploymentApp>,
            error_policy::<DeploymentApp>,
            dep_ctx,
        )
        .for_each(log_reconcile_result("Deployment"));

    tracing::info!("- Organization controller");
    tracing::info!("- Deployment controller");

    vec![Box::pin(org_ctrl), Box::pin(dep_ctrl)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
