//! Persisted resource access
//!
//! Reconciliation and lookups read and write Organizations and Deployments
//! through [`ResourceStore`], so the engine can be exercised against mocks or
//! an in-memory store while production talks to the API server.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Deployment, Organization, ResolvedStatus, ResourceKind};
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting the persisted-resource store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List every Organization in a namespace
    async fn list_organizations(&self, namespace: &str) -> Result<Vec<Organization>, Error>;

    /// Get an Organization, `None` if it does not exist
    async fn get_organization(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Organization>, Error>;

    /// Get a Deployment, `None` if it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// Replace the status subresource of a resource
    async fn patch_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: &ResolvedStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer if not already present
    async fn add_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Remove a finalizer if present
    async fn remove_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Merge labels into the resource metadata
    async fn apply_labels(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), Error>;
}

/// API-server backed store
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn merge_patch<K>(api: &Api<K>, name: &str, patch: &Value) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn merge_patch_status<K>(
    api: &Api<K>,
    name: &str,
    patch: &Value,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

/// Build the merge patch body for a status write.
///
/// A merge patch leaves absent keys untouched, so every optional field the
/// status omits is sent as an explicit `null` to clear what the API server
/// holds.
pub fn status_patch(status: &ResolvedStatus) -> Result<Value, Error> {
    let mut body =
        serde_json::to_value(status).map_err(|e| Error::serialization(e.to_string()))?;
    let fields = body
        .as_object_mut()
        .ok_or_else(|| Error::serialization("status did not serialize to an object"))?;

    fields
        .entry("conditions")
        .or_insert_with(|| Value::Array(Vec::new()));
    fields.entry("observedGeneration").or_insert(Value::Null);
    if let Value::Object(strategy) = fields
        .entry("resolvedAddressAllocationStrategy")
        .or_insert(Value::Null)
    {
        strategy.entry("type").or_insert(Value::Null);
        strategy.entry("prefixLength").or_insert(Value::Null);
    }
    if let Some(health) = fields.get_mut("health").and_then(Value::as_object_mut) {
        health.entry("reason").or_insert(Value::Null);
    }

    Ok(serde_json::json!({ "status": body }))
}

async fn current_finalizers<K>(api: &Api<K>, name: &str) -> Result<Vec<String>, Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let resource = api.get(name).await?;
    Ok(resource.meta().finalizers.clone().unwrap_or_default())
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn list_organizations(&self, namespace: &str) -> Result<Vec<Organization>, Error> {
        let api: Api<Organization> = self.api(namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_organization(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Organization>, Error> {
        let api: Api<Organization> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: &ResolvedStatus,
    ) -> Result<(), Error> {
        let patch = status_patch(status)?;
        match kind {
            ResourceKind::Organization => {
                merge_patch_status(&self.api::<Organization>(namespace), name, &patch).await
            }
            ResourceKind::Deployment => {
                merge_patch_status(&self.api::<Deployment>(namespace), name, &patch).await
            }
        }
    }

    async fn add_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let mut finalizers = match kind {
            ResourceKind::Organization => {
                current_finalizers(&self.api::<Organization>(namespace), name).await?
            }
            ResourceKind::Deployment => {
                current_finalizers(&self.api::<Deployment>(namespace), name).await?
            }
        };

        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        debug!(%kind, namespace, name, finalizer, "adding finalizer");
        match kind {
            ResourceKind::Organization => {
                merge_patch(&self.api::<Organization>(namespace), name, &patch).await
            }
            ResourceKind::Deployment => {
                merge_patch(&self.api::<Deployment>(namespace), name, &patch).await
            }
        }
    }

    async fn remove_finalizer(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let finalizers: Vec<String> = match kind {
            ResourceKind::Organization => {
                current_finalizers(&self.api::<Organization>(namespace), name).await?
            }
            ResourceKind::Deployment => {
                current_finalizers(&self.api::<Deployment>(namespace), name).await?
            }
        }
        .into_iter()
        .filter(|f| f != finalizer)
        .collect();

        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        debug!(%kind, namespace, name, finalizer, "removing finalizer");
        match kind {
            ResourceKind::Organization => {
                merge_patch(&self.api::<Organization>(namespace), name, &patch).await
            }
            ResourceKind::Deployment => {
                merge_patch(&self.api::<Deployment>(namespace), name, &patch).await
            }
        }
    }

    async fn apply_labels(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        match kind {
            ResourceKind::Organization => {
                merge_patch(&self.api::<Organization>(namespace), name, &patch).await
            }
            ResourceKind::Deployment => {
                merge_patch(&self.api::<Deployment>(namespace), name, &patch).await
            }
        }
    }
}
