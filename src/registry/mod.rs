//! Registry lookups for downstream consumers
//!
//! [`RegistryLocator`] answers two questions for an encoded hierarchical
//! name: which registers are bound to it, and where the backend serving a
//! register kind lives.

mod client;
mod discovery;

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::crd::{AddressAllocationStrategy, ManagedResource, RegisterKind, RegisterMap};
use crate::identity::HierarchicalName;
use crate::inheritance::validate_mandatory;
use crate::store::ResourceStore;
use crate::{Error, CONTROL_NAMESPACE};

pub use client::{
    ClientFactory, CredentialInterceptor, Credentials, RegistryClient, TlsPolicy,
    TonicClientFactory, DEFAULT_CONNECT_TIMEOUT, PASSWORD_METADATA, USERNAME_METADATA,
};
pub use discovery::{KubeServiceDiscovery, ServiceDiscovery};

#[cfg(test)]
pub use client::MockClientFactory;
#[cfg(test)]
pub use discovery::MockServiceDiscovery;

/// Default prefix of registry service endpoints
pub const DEFAULT_SERVICE_PREFIX: &str = "ndd-gnmi-svc";

/// Default cluster-local suffix of registry service endpoints
pub const DEFAULT_SERVICE_SUFFIX: &str = "ndd-system.svc.cluster.local";

/// Default registry service port
pub const DEFAULT_SERVICE_PORT: u16 = 9999;

/// Where and how registry backends are reached
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Namespace the registry instances run in
    pub control_namespace: String,
    /// Endpoint host prefix
    pub service_prefix: String,
    /// Endpoint host suffix
    pub service_suffix: String,
    /// Endpoint port
    pub port: u16,
    /// Identity presented to backends
    pub credentials: Credentials,
    /// Transport security
    pub tls: TlsPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            control_namespace: CONTROL_NAMESPACE.to_string(),
            service_prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            service_suffix: DEFAULT_SERVICE_SUFFIX.to_string(),
            port: DEFAULT_SERVICE_PORT,
            credentials: Credentials::default(),
            tls: TlsPolicy::default(),
        }
    }
}

/// Registry service name fragment serving `kind`
pub fn registry_service(kind: RegisterKind) -> Result<&'static str, Error> {
    match kind {
        RegisterKind::Ipam => Ok("nddr-ipam-registry"),
        RegisterKind::As => Ok("nddr-as-registry"),
        RegisterKind::Ni => Ok("nddr-ni-registry"),
        other => Err(Error::UnknownRegisterKind {
            kind: other.to_string(),
        }),
    }
}

/// `host:port` of the service fronting `instance`.
///
/// The last two dash-separated tokens of an instance name are generated
/// suffixes and are dropped; the first token is always kept.
pub fn endpoint_name(instance: &str, config: &DiscoveryConfig) -> String {
    let tokens: Vec<&str> = instance.split('-').collect();
    let keep = tokens.len().saturating_sub(2).max(1);
    let stem = tokens[..keep].join("-");
    format!(
        "{}-{}.{}:{}",
        config.service_prefix, stem, config.service_suffix, config.port
    )
}

/// Resolves hierarchical names to registers and register kinds to backends
pub struct RegistryLocator {
    store: Arc<dyn ResourceStore>,
    discovery: Arc<dyn ServiceDiscovery>,
    dialer: Arc<dyn ClientFactory>,
    config: DiscoveryConfig,
}

impl RegistryLocator {
    /// Create a locator
    pub fn new(
        store: Arc<dyn ResourceStore>,
        discovery: Arc<dyn ServiceDiscovery>,
        dialer: Arc<dyn ClientFactory>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            store,
            discovery,
            dialer,
            config,
        }
    }

    /// Discovery configuration in use
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Resolved register of the resource `name` addresses.
    ///
    /// Fails with `CriticalRegisterMissing` when a mandatory kind is absent,
    /// for organizations as well as deployments.
    #[instrument(skip(self))]
    pub async fn get_register(&self, namespace: &str, name: &str) -> Result<RegisterMap, Error> {
        let register = match HierarchicalName::parse(name)?.is_deployment() {
            true => self
                .store
                .get_deployment(namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("Deployment", namespace, name))?
                .resolved_register(),
            false => self
                .store
                .get_organization(namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("Organization", namespace, name))?
                .resolved_register(),
        };
        validate_mandatory(&register)?;
        Ok(register)
    }

    /// Resolved allocation strategy of the resource `name` addresses
    #[instrument(skip(self))]
    pub async fn get_address_allocation_strategy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AddressAllocationStrategy>, Error> {
        let strategy = match HierarchicalName::parse(name)?.is_deployment() {
            true => self
                .store
                .get_deployment(namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("Deployment", namespace, name))?
                .resolved_allocation_strategy(),
            false => self
                .store
                .get_organization(namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("Organization", namespace, name))?
                .resolved_allocation_strategy(),
        };
        Ok(strategy)
    }

    /// Open a channel to the backend serving `kind`
    #[instrument(skip(self))]
    pub async fn get_registry_client(&self, kind: RegisterKind) -> Result<RegistryClient, Error> {
        let fragment = registry_service(kind)?;
        let instances = self
            .discovery
            .list_instances(&self.config.control_namespace)
            .await?;
        let instance = instances
            .iter()
            .find(|name| name.contains(fragment))
            .ok_or_else(|| Error::NoInstanceFound {
                kind,
                fragment: fragment.to_string(),
            })?;

        let endpoint = endpoint_name(instance, &self.config);
        debug!(%instance, %endpoint, "registry backend selected");
        self.dialer
            .dial(&endpoint, &self.config.credentials, &self.config.tls)
            .await
    }
}
