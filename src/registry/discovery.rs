//! Registry backend discovery

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Trait abstracting how live registry instances are enumerated
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Names of the live instances in `namespace`
    async fn list_instances(&self, namespace: &str) -> Result<Vec<String>, Error>;
}

/// Pod-listing discovery against the API server
pub struct KubeServiceDiscovery {
    client: Client,
}

impl KubeServiceDiscovery {
    /// Create a new discovery wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceDiscovery for KubeServiceDiscovery {
    async fn list_instances(&self, namespace: &str) -> Result<Vec<String>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default()).await?;
        Ok(pods.items.iter().map(|pod| pod.name_any()).collect())
    }
}
