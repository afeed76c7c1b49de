//! Reconciliation engine for Organizations and Deployments
//!
//! One generic control loop drives both kinds. Each kind plugs in an
//! [`Application`] that knows how to resolve it; the engine owns the
//! lifecycle around it:
//!
//! - deletion: run `delete`, then `final_delete`, then drop the finalizer
//! - first sight: add the finalizer
//! - every pass: `initialize`, `update`, persist the status, requeue after
//!   `timeout`
//!
//! `kube::runtime::Controller` never runs two passes for the same object at
//! once; distinct objects reconcile concurrently.

mod attempts;
mod deployment;
mod organization;
mod timeout;
mod watcher;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{Condition, ConditionStatus, HealthStatus, ManagedResource, OperState};
use crate::store::ResourceStore;
use crate::Error;

pub use attempts::{AttemptTracker, NOT_TRACKED};
pub use deployment::{DeploymentApp, ORGANIZATION_LABEL, ORGANIZATION_NOT_FOUND};
pub use organization::OrganizationApp;
pub use timeout::{TimeoutPolicy, RECONCILE_PERIOD, SHORT_WAIT, VERY_SHORT_WAIT};
pub use watcher::deployments_for_organization;

/// Finalizer placed on every reconciled resource
pub const FINALIZER: &str = "org.nddr.dev/finalizer";

/// Reason recorded when a resource is administratively disabled
pub const ADMIN_STATE_DISABLED: &str = "admin state disabled";

/// Default deadline for a whole reconciliation pass
pub const DEFAULT_PASS_DEADLINE: Duration = Duration::from_secs(30);

/// Requeue delay after a transient failure
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Condition type maintained by the engine
pub const READY_CONDITION: &str = "Ready";

/// Labels an application wants merged into the resource metadata
pub type Labels = BTreeMap<String, String>;

/// Namespace/name identity of a reconciled resource
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Namespace of the resource
    pub namespace: String,
    /// Name of the resource
    pub name: String,
}

impl ResourceId {
    /// Create an identity
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a resource; fails when the object cannot be addressed
    pub fn of<K: ManagedResource>(resource: &K) -> Result<Self, Error> {
        let name = resource.meta().name.clone().ok_or_else(|| {
            Error::unexpected_resource(K::KIND.to_string(), "object has no name")
        })?;
        let namespace = resource.namespace().ok_or_else(|| {
            Error::unexpected_resource(K::KIND.to_string(), format!("{name} has no namespace"))
        })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind-specific reconciliation logic
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Resource kind this application reconciles
    type Resource: ManagedResource;

    /// Allocate the resolved-state block if absent; never touches an
    /// existing block.
    fn initialize(&self, resource: &mut Self::Resource) -> Result<(), Error> {
        ResourceId::of(resource)?;
        if resource.initialize_state() {
            debug!(name = %resource.name_any(), "resolved state allocated");
        }
        Ok(())
    }

    /// Recompute the resolved state in place; returns labels to merge
    async fn update(&self, resource: &mut Self::Resource) -> Result<Labels, Error>;

    /// Delay until the next forced reconciliation
    fn timeout(&self, resource: &Self::Resource) -> Duration;

    /// Run deletion side effects; true when the resource may be finalized
    async fn delete(&self, resource: &Self::Resource) -> Result<bool, Error>;

    /// Drop in-memory bookkeeping for the resource
    fn final_delete(&self, resource: &Self::Resource);
}

/// Shared state for one controller
pub struct Context<A: Application> {
    /// Kind-specific logic
    pub app: A,
    /// Store used to persist status and finalizers
    pub store: Arc<dyn ResourceStore>,
    /// Deadline for a whole pass
    pub deadline: Duration,
}

impl<A: Application> Context<A> {
    /// Create a context with the default pass deadline
    pub fn new(app: A, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            app,
            store,
            deadline: DEFAULT_PASS_DEADLINE,
        }
    }

    /// Override the pass deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Start a pass for `id`: track it, and re-arm its counter when the spec
/// changed since the last persisted status.
pub(crate) fn begin_pass<K: ManagedResource>(
    attempts: &AttemptTracker,
    id: &ResourceId,
    resource: &K,
) {
    attempts.init(id);
    let observed = resource.state().and_then(|s| s.observed_generation);
    if observed.is_some() && observed != resource.meta().generation {
        attempts.reset(id);
    }
}

/// Reconcile one resource
///
/// The whole pass runs under the context deadline; an exceeded deadline
/// discards the pass and is reported as a retryable error.
#[instrument(
    skip(resource, ctx),
    fields(kind = %<A::Resource as ManagedResource>::KIND, name = %resource.name_any())
)]
pub async fn reconcile<A: Application>(
    resource: Arc<A::Resource>,
    ctx: Arc<Context<A>>,
) -> Result<Action, Error> {
    match tokio::time::timeout(ctx.deadline, reconcile_pass(resource.as_ref(), &ctx)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(deadline = ?ctx.deadline, "reconciliation deadline exceeded");
            Err(Error::deadline("reconcile", ctx.deadline))
        }
    }
}

async fn reconcile_pass<A: Application>(
    resource: &A::Resource,
    ctx: &Context<A>,
) -> Result<Action, Error> {
    let kind = <A::Resource as ManagedResource>::KIND;
    let id = ResourceId::of(resource)?;

    if resource.meta().deletion_timestamp.is_some() {
        return handle_deletion(resource, &id, ctx).await;
    }

    if !has_finalizer(resource) {
        info!("adding finalizer");
        ctx.store
            .add_finalizer(kind, &id.namespace, &id.name, FINALIZER)
            .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut working = resource.clone();
    ctx.app.initialize(&mut working)?;

    match ctx.app.update(&mut working).await {
        Ok(labels) => {
            persist_status(resource, &mut working, &id, ctx).await?;
            if !labels.is_empty() {
                ctx.store
                    .apply_labels(kind, &id.namespace, &id.name, &labels)
                    .await?;
            }
            let requeue = ctx.app.timeout(&working);
            debug!(status = %working.status(), ?requeue, "reconciled");
            Ok(Action::requeue(requeue))
        }
        Err(e) if e.surfaces_in_status() => {
            warn!(error = %e, "resolution failed");
            persist_status(resource, &mut working, &id, ctx).await?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn handle_deletion<A: Application>(
    resource: &A::Resource,
    id: &ResourceId,
    ctx: &Context<A>,
) -> Result<Action, Error> {
    if !has_finalizer(resource) {
        debug!("no finalizer, allowing deletion");
        return Ok(Action::await_change());
    }

    if !ctx.app.delete(resource).await? {
        debug!("deletion not finished, waiting");
        return Ok(Action::requeue(ERROR_REQUEUE));
    }

    ctx.app.final_delete(resource);
    ctx.store
        .remove_finalizer(
            <A::Resource as ManagedResource>::KIND,
            &id.namespace,
            &id.name,
            FINALIZER,
        )
        .await?;
    info!("finalized");
    Ok(Action::await_change())
}

/// Derive conditions and health, then write the status if it changed
async fn persist_status<A: Application>(
    original: &A::Resource,
    working: &mut A::Resource,
    id: &ResourceId,
    ctx: &Context<A>,
) -> Result<(), Error> {
    stamp_status(working);
    if working.state() == original.state() {
        return Ok(());
    }
    let Some(status) = working.state() else {
        return Ok(());
    };
    ctx.store
        .patch_status(
            <A::Resource as ManagedResource>::KIND,
            &id.namespace,
            &id.name,
            status,
        )
        .await
}

fn stamp_status<K: ManagedResource>(resource: &mut K) {
    let generation = resource.meta().generation;
    let oper = resource.status();
    let reason = resource.reason().to_string();
    let Some(block) = resource.state_mut().as_mut() else {
        return;
    };

    block.observed_generation = generation;
    let (condition, health) = match oper {
        OperState::Up => (
            Condition::new(READY_CONDITION, ConditionStatus::True, "Resolved", ""),
            HealthStatus {
                percentage: 100,
                reason: None,
            },
        ),
        OperState::Down => (
            Condition::new(
                READY_CONDITION,
                ConditionStatus::False,
                "ResolutionFailed",
                reason.clone(),
            ),
            HealthStatus {
                percentage: 0,
                reason: Some(reason),
            },
        ),
        OperState::Unknown => (
            Condition::new(READY_CONDITION, ConditionStatus::Unknown, "Pending", ""),
            HealthStatus::default(),
        ),
    };
    block.set_condition(condition);
    block.health = health;
}

fn has_finalizer<K: ManagedResource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == FINALIZER)
}

/// Error policy for both controllers: log and requeue.
///
/// Failures already reported in status, and objects the controller cannot
/// address, wait for the next regular period. Transient failures come back
/// after [`ERROR_REQUEUE`].
pub fn error_policy<A: Application>(
    resource: Arc<A::Resource>,
    error: &Error,
    ctx: Arc<Context<A>>,
) -> Action {
    error!(
        %error,
        kind = %<A::Resource as ManagedResource>::KIND,
        name = %resource.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.surfaces_in_status() || matches!(error, Error::UnexpectedResource { .. }) {
        Action::requeue(ctx.app.timeout(&resource))
    } else {
        Action::requeue(ERROR_REQUEUE)
    }
}
