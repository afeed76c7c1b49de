//! Namespace provisioning for Organizations
//!
//! Every Organization owns a cluster namespace of the same name. The
//! namespace carries a controller owner reference back to the Organization.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::Organization;
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting namespace side effects of an Organization
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceProvisioner: Send + Sync {
    /// Create or update the organization namespace
    async fn ensure_namespace(&self, organization: &Organization) -> Result<(), Error>;

    /// Delete the organization namespace; a missing namespace is not an error
    async fn delete_namespace(&self, organization: &Organization) -> Result<(), Error>;
}

/// Build the namespace object owned by an organization
pub fn organization_namespace(organization: &Organization) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(organization.name_any()),
            owner_references: organization.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// API-server backed namespace provisioner
pub struct KubeNamespaceProvisioner {
    client: Client,
}

impl KubeNamespaceProvisioner {
    /// Create a new provisioner wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceProvisioner for KubeNamespaceProvisioner {
    async fn ensure_namespace(&self, organization: &Organization) -> Result<(), Error> {
        let namespace = organization_namespace(organization);
        let name = organization.name_any();
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&namespace),
        )
        .await?;
        debug!(namespace = %name, "organization namespace applied");
        Ok(())
    }

    async fn delete_namespace(&self, organization: &Organization) -> Result<(), Error> {
        let name = organization.name_any();
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %name, "organization namespace deleted");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace = %name, "organization namespace already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
