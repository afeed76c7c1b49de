//! Error types for the organization registry
//!
//! Errors fall into two groups that the reconciliation engine treats
//! differently:
//! - business failures (missing ancestor, missing critical register, bad
//!   names) are written into the resource status as `down` with a reason
//! - infrastructure failures (API server unreachable, deadline exceeded) are
//!   returned to the controller so it backs off without touching the status

use std::time::Duration;

use thiserror::Error;

use crate::crd::RegisterKind;

/// Main error type for registry operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An object reached a controller that cannot address it as its kind
    #[error("unexpected {kind} object: {message}")]
    UnexpectedResource {
        /// Kind the controller expected
        kind: String,
        /// What was wrong with the object
        message: String,
    },

    /// A referenced resource does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing resource
        kind: String,
        /// Namespace that was searched
        namespace: String,
        /// Name that was looked up
        name: String,
    },

    /// Validation error for names or specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// The resource (or input) that failed validation
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// A mandatory register kind is absent from a resolved register map
    #[error("critical register {kind} not found in registry")]
    CriticalRegisterMissing {
        /// The missing register kind
        kind: RegisterKind,
    },

    /// Register kind has no backing registry service
    #[error("wrong register request, name not found: {kind}")]
    UnknownRegisterKind {
        /// The requested kind
        kind: String,
    },

    /// No live instance matched the registry service fragment
    #[error("no instance that matches {kind}, {fragment}")]
    NoInstanceFound {
        /// The requested register kind
        kind: RegisterKind,
        /// The service name fragment that was searched for
        fragment: String,
    },

    /// The composed endpoint could not be turned into a URI
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint {
        /// The endpoint that was rejected
        endpoint: String,
        /// Parser message
        message: String,
    },

    /// Connecting to a registry backend failed
    #[error("cannot connect to {endpoint}: {source}")]
    Dial {
        /// The endpoint being dialed
        endpoint: String,
        /// The transport error, unchanged
        #[source]
        source: tonic::transport::Error,
    },

    /// An operation ran past its deadline
    #[error("{operation} exceeded deadline of {timeout:?}")]
    DeadlineExceeded {
        /// The operation that was aborted
        operation: String,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred (e.g. "reconciler", "finalizer")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an unexpected-resource error for the given kind
    pub fn unexpected_resource(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UnexpectedResource {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a validation error for the named resource
    pub fn validation(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a deadline error for the named operation
    pub fn deadline(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Returns true if this error is a business failure that belongs in the
    /// resource status rather than in controller backoff only.
    pub fn surfaces_in_status(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Validation { .. } | Self::CriticalRegisterMissing { .. }
        )
    }

    /// Returns true if retrying the same call later may succeed without
    /// any spec change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube { .. }
            | Self::Dial { .. }
            | Self::DeadlineExceeded { .. }
            | Self::NoInstanceFound { .. }
            | Self::NotFound { .. }
            | Self::CriticalRegisterMissing { .. } => true,
            Self::UnexpectedResource { .. }
            | Self::Validation { .. }
            | Self::UnknownRegisterKind { .. }
            | Self::InvalidEndpoint { .. }
            | Self::Serialization { .. }
            | Self::Internal { .. } => false,
        }
    }
}
