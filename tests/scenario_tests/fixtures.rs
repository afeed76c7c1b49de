//! Shared fixtures: an in-memory store that behaves like the API server for
//! the calls the engine makes, and fakes for namespaces and backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;

use org_registry::controller::{
    reconcile, AttemptTracker, Context, DeploymentApp, OrganizationApp, TimeoutPolicy,
};
use org_registry::crd::{
    Deployment, DeploymentSpec, ManagedResource, Organization, OrganizationSpec, Register,
    RegisterKind, ResolvedStatus, ResourceKind,
};
use org_registry::namespace::NamespaceProvisioner;
use org_registry::registry::{
    ClientFactory, Credentials, DiscoveryConfig, RegistryClient, RegistryLocator,
    ServiceDiscovery, TlsPolicy,
};
use org_registry::store::{status_patch, ResourceStore};
use org_registry::Error;

pub const NAMESPACE: &str = "tenants";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Apply a status write the way the API server applies a merge patch
fn merge_status(
    current: Option<&ResolvedStatus>,
    status: &ResolvedStatus,
) -> Result<ResolvedStatus, Error> {
    let mut doc = serde_json::json!({ "status": current });
    json_patch::merge(&mut doc, &status_patch(status)?);
    serde_json::from_value(doc["status"].take()).map_err(|e| Error::serialization(e.to_string()))
}

/// Store keeping objects in memory. Removing the last finalizer of an object
/// marked for deletion drops it, as the API server would.
#[derive(Default)]
pub struct InMemoryStore {
    organizations: Mutex<BTreeMap<Key, Organization>>,
    deployments: Mutex<BTreeMap<Key, Deployment>>,
}

impl InMemoryStore {
    pub fn put_organization(&self, org: Organization) {
        let k = key(&org.namespace().unwrap_or_default(), &org.name_any());
        self.organizations.lock().insert(k, org);
    }

    pub fn put_deployment(&self, dep: Deployment) {
        let k = key(&dep.namespace().unwrap_or_default(), &dep.name_any());
        self.deployments.lock().insert(k, dep);
    }

    pub fn organization(&self, name: &str) -> Option<Organization> {
        self.organizations.lock().get(&key(NAMESPACE, name)).cloned()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.deployments.lock().get(&key(NAMESPACE, name)).cloned()
    }

    /// Request deletion; objects with finalizers only get a timestamp
    pub fn delete_organization(&self, name: &str) {
        let mut orgs = self.organizations.lock();
        let k = key(NAMESPACE, name);
        let Some(org) = orgs.get_mut(&k) else {
            return;
        };
        if org.finalizers().is_empty() {
            orgs.remove(&k);
        } else {
            org.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
    }

    /// Change the spec the way `kubectl apply` would: bump the generation
    pub fn update_organization(&self, name: &str, edit: impl FnOnce(&mut Organization)) {
        if let Some(org) = self.organizations.lock().get_mut(&key(NAMESPACE, name)) {
            edit(org);
            org.metadata.generation = Some(org.metadata.generation.unwrap_or(0) + 1);
        }
    }

    fn with_meta<R>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut kube::api::ObjectMeta) -> R,
    ) -> Result<R, Error> {
        let k = key(namespace, name);
        let missing = || Error::not_found(kind.to_string(), namespace, name);
        match kind {
            ResourceKind::Organization => {
                let mut orgs = self.organizations.lock();
                let org = orgs.get_mut(&k).ok_or_else(missing)?;
                let out = f(org.meta_mut());
                if org.metadata.deletion_timestamp.is_some() && org.finalizers().is_empty() {
                    orgs.remove(&k);
                }
                Ok(out)
            }
            ResourceKind::Deployment => {
                let mut deps = self.deployments.lock();
                let dep = deps.get_mut(&k).ok_or_else(missing)?;
                let out = f(dep.meta_mut());
                if dep.metadata.deletion_timestamp.is_some() && dep.finalizers().is_empty() {
                    deps.remove(&k);
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn list_organizations(&self, namespace: &str) -> Result<Vec<Organization>, Error> {
        Ok(self
            .organizations
            .lock()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, org)| org.clone())
            .collect())
    }

    async fn get_organization(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Organization>, Error> {
        Ok(self.organizations.lock().get(&key(namespace, name)).cloned())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        Ok(self.deployments.lock().get(&key(namespace, name)).cloned())
    }

    async fn patch_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: &ResolvedStatus,
    ) -> Result<(), Error> {
        let k = key(namespace, name);
        let missing = || Error::not_found(kind.to_string(), namespace, name);
        match kind {
            ResourceKind::Organization => {
                let mut orgs = self.organizations.lock();
                let org = orgs.get_mut(&k).ok_or_else(missing)?;
                org.status = Some(merge_status(org.status.as_ref(), status)?);
            }
            ResourceKind::Deployment => {
                let mut deps = self.deployments.lock();
                let dep = deps.get_mut(&k).ok_or_else(missing)?;
                dep.status = Some(merge_status(dep.status.as_ref(), status)?);
            }
        }
        Ok(())
    }

    async fn add_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        self.with_meta(kind, namespace, name, |meta| {
            let finalizers = meta.finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        })
    }

    async fn remove_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        self.with_meta(kind, namespace, name, |meta| {
            if let Some(finalizers) = meta.finalizers.as_mut() {
                finalizers.retain(|f| f != finalizer);
            }
        })
    }

    async fn apply_labels(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        self.with_meta(kind, namespace, name, |meta| {
            meta.labels
                .get_or_insert_with(BTreeMap::new)
                .extend(labels.clone());
        })
    }
}

/// Records namespace side effects
#[derive(Default)]
pub struct FakeNamespaces {
    pub ensured: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl NamespaceProvisioner for FakeNamespaces {
    async fn ensure_namespace(&self, organization: &Organization) -> Result<(), Error> {
        self.ensured.lock().push(organization.name_any());
        Ok(())
    }

    async fn delete_namespace(&self, organization: &Organization) -> Result<(), Error> {
        self.deleted.lock().push(organization.name_any());
        Ok(())
    }
}

/// Discovery returning a fixed instance list
pub struct StaticDiscovery(pub Vec<String>);

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn list_instances(&self, _namespace: &str) -> Result<Vec<String>, Error> {
        Ok(self.0.clone())
    }
}

/// Dialer that never touches the network and remembers what it was asked
#[derive(Default)]
pub struct RecordingDialer {
    pub dialed: Mutex<Vec<(String, Credentials, TlsPolicy)>>,
}

#[async_trait]
impl ClientFactory for RecordingDialer {
    async fn dial(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        tls: &TlsPolicy,
    ) -> Result<RegistryClient, Error> {
        self.dialed
            .lock()
            .push((endpoint.to_string(), credentials.clone(), tls.clone()));
        RegistryClient::lazy(endpoint, credentials)
    }
}

/// Both controllers wired to one in-memory store
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub namespaces: Arc<FakeNamespaces>,
    pub org_ctx: Arc<Context<OrganizationApp>>,
    pub dep_ctx: Arc<Context<DeploymentApp>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(TimeoutPolicy::default())
    }

    pub fn with_policy(policy: TimeoutPolicy) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let namespaces = Arc::new(FakeNamespaces::default());
        let org_app = OrganizationApp::new(
            namespaces.clone(),
            Arc::new(AttemptTracker::new()),
            policy.clone(),
        );
        let dep_app = DeploymentApp::new(store.clone(), Arc::new(AttemptTracker::new()), policy);
        Self {
            org_ctx: Arc::new(Context::new(org_app, store.clone())),
            dep_ctx: Arc::new(Context::new(dep_app, store.clone())),
            store,
            namespaces,
        }
    }

    /// One pass over the stored organization
    pub async fn reconcile_organization(&self, name: &str) -> Result<Action, Error> {
        let org = self
            .store
            .organization(name)
            .ok_or_else(|| Error::not_found("Organization", NAMESPACE, name))?;
        reconcile(Arc::new(org), self.org_ctx.clone()).await
    }

    /// One pass over the stored deployment
    pub async fn reconcile_deployment(&self, name: &str) -> Result<Action, Error> {
        let dep = self
            .store
            .deployment(name)
            .ok_or_else(|| Error::not_found("Deployment", NAMESPACE, name))?;
        reconcile(Arc::new(dep), self.dep_ctx.clone()).await
    }

    /// Finalizer pass, then a resolution pass
    pub async fn converge_organization(&self, name: &str) -> Result<Action, Error> {
        self.reconcile_organization(name).await?;
        self.reconcile_organization(name).await
    }

    /// Finalizer pass, then a resolution pass
    pub async fn converge_deployment(&self, name: &str) -> Result<Action, Error> {
        self.reconcile_deployment(name).await?;
        self.reconcile_deployment(name).await
    }

    pub fn locator(&self, discovery: Vec<String>, dialer: Arc<RecordingDialer>) -> RegistryLocator {
        RegistryLocator::new(
            self.store.clone(),
            Arc::new(StaticDiscovery(discovery)),
            dialer,
            DiscoveryConfig::default(),
        )
    }
}

fn registers(entries: &[(RegisterKind, &str)]) -> Vec<Register> {
    entries
        .iter()
        .map(|(kind, name)| Register::new(*kind, *name))
        .collect()
}

pub fn organization(name: &str, entries: &[(RegisterKind, &str)]) -> Organization {
    let mut spec = OrganizationSpec::default();
    spec.properties.register = registers(entries);
    let mut org = Organization::new(name, spec);
    org.metadata.namespace = Some(NAMESPACE.to_string());
    org.metadata.generation = Some(1);
    org.metadata.uid = Some(format!("uid-{name}"));
    org
}

pub fn deployment(name: &str, entries: &[(RegisterKind, &str)]) -> Deployment {
    let mut spec = DeploymentSpec::default();
    spec.properties.register = registers(entries);
    let mut dep = Deployment::new(name, spec);
    dep.metadata.namespace = Some(NAMESPACE.to_string());
    dep.metadata.generation = Some(1);
    dep
}

/// Resolved view of a stored resource, for assertions
pub fn resolved<K: ManagedResource>(resource: &K) -> BTreeMap<RegisterKind, String> {
    resource.resolved_register()
}
