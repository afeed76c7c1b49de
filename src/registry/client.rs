//! gRPC channels to registry backends
//!
//! Connection security is a [`TlsPolicy`] and identity is a [`Credentials`]
//! value, both carried in the discovery configuration. The defaults keep
//! the historical deployment working (`admin`/`admin`, plaintext); switching
//! to [`TlsPolicy::Verified`] hardens the channel without touching discovery.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Metadata key carrying the username
pub const USERNAME_METADATA: &str = "username";

/// Metadata key carrying the password
pub const PASSWORD_METADATA: &str = "password";

/// Default connect timeout for registry channels
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Username/password presented to registry backends
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "admin")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport security for registry channels
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Plaintext, no certificate validation
    #[default]
    Insecure,
    /// TLS, server certificate validated against `ca_pem`
    Verified {
        /// PEM-encoded CA bundle
        ca_pem: String,
        /// Server name to verify; the endpoint host when unset
        domain: Option<String>,
    },
}

impl TlsPolicy {
    fn scheme(&self) -> &'static str {
        match self {
            Self::Insecure => "http",
            Self::Verified { .. } => "https",
        }
    }
}

/// Stamps credentials onto every outgoing request
#[derive(Clone)]
pub struct CredentialInterceptor {
    username: AsciiMetadataValue,
    password: AsciiMetadataValue,
}

impl CredentialInterceptor {
    /// Build an interceptor; credentials must be valid ASCII metadata
    pub fn new(credentials: &Credentials) -> Result<Self, Error> {
        let value = |field: &str, raw: &str| {
            AsciiMetadataValue::try_from(raw).map_err(|_| {
                Error::validation("credentials", format!("{field} is not valid metadata"))
            })
        };
        Ok(Self {
            username: value(USERNAME_METADATA, &credentials.username)?,
            password: value(PASSWORD_METADATA, &credentials.password)?,
        })
    }
}

impl fmt::Debug for CredentialInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialInterceptor")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Interceptor for CredentialInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(USERNAME_METADATA, self.username.clone());
        metadata.insert(PASSWORD_METADATA, self.password.clone());
        Ok(request)
    }
}

/// Channel to one registry backend
#[derive(Clone, Debug)]
pub struct RegistryClient {
    endpoint: String,
    channel: Channel,
    interceptor: CredentialInterceptor,
}

impl RegistryClient {
    /// Wrap an established channel
    pub fn new(
        endpoint: impl Into<String>,
        channel: Channel,
        interceptor: CredentialInterceptor,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            channel,
            interceptor,
        }
    }

    /// Client that connects on first use, plaintext only
    pub fn lazy(endpoint: &str, credentials: &Credentials) -> Result<Self, Error> {
        let channel = plaintext_endpoint(endpoint)?.connect_lazy();
        Ok(Self::new(endpoint, channel, CredentialInterceptor::new(credentials)?))
    }

    /// `host:port` this client talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Service stack for generated gRPC clients; every call carries the
    /// credentials
    pub fn intercepted(&self) -> InterceptedService<Channel, CredentialInterceptor> {
        InterceptedService::new(self.channel.clone(), self.interceptor.clone())
    }
}

fn parse_endpoint(uri: String, endpoint: &str) -> Result<Endpoint, Error> {
    Endpoint::from_shared(uri).map_err(|e| Error::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

fn plaintext_endpoint(endpoint: &str) -> Result<Endpoint, Error> {
    parse_endpoint(format!("http://{endpoint}"), endpoint)
}

/// Host part of a `host:port` endpoint
fn endpoint_host(endpoint: &str) -> &str {
    endpoint
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(endpoint)
}

/// Trait abstracting how registry channels are opened
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Open a channel to `endpoint` (`host:port`)
    async fn dial(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        tls: &TlsPolicy,
    ) -> Result<RegistryClient, Error>;
}

/// tonic-backed channel factory
#[derive(Clone, Debug)]
pub struct TonicClientFactory {
    connect_timeout: Duration,
}

impl TonicClientFactory {
    /// Create a factory with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TonicClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl ClientFactory for TonicClientFactory {
    async fn dial(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        tls: &TlsPolicy,
    ) -> Result<RegistryClient, Error> {
        let interceptor = CredentialInterceptor::new(credentials)?;
        let mut builder = parse_endpoint(format!("{}://{endpoint}", tls.scheme()), endpoint)?
            .connect_timeout(self.connect_timeout);

        if let TlsPolicy::Verified { ca_pem, domain } = tls {
            let domain = domain
                .clone()
                .unwrap_or_else(|| endpoint_host(endpoint).to_string());
            let tls_config = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(ca_pem))
                .domain_name(domain);
            builder = builder.tls_config(tls_config).map_err(|source| Error::Dial {
                endpoint: endpoint.to_string(),
                source,
            })?;
        } else {
            debug!(%endpoint, "dialing registry without TLS");
        }

        let channel = builder.connect().await.map_err(|source| Error::Dial {
            endpoint: endpoint.to_string(),
            source,
        })?;
        info!(%endpoint, scheme = tls.scheme(), "connected to registry");
        Ok(RegistryClient::new(endpoint, channel, interceptor))
    }
}
