//! Org Registry - hierarchical register inheritance for Organizations and Deployments
//!
//! Organizations bind logical subsystems (IPAM, AS numbers, network
//! instances, ...) to named registers. Deployments belong to an Organization
//! and inherit every binding they do not set themselves.
//!
//! # Architecture
//!
//! - Two controllers reconcile Organizations and Deployments into a resolved
//!   status (`up`/`down`, resolved register, resolved allocation strategy)
//! - A change to an Organization requeues every Deployment in its namespace
//! - [`registry::RegistryLocator`] serves lookups of resolved registers and
//!   locates the backend serving a register kind
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Organization, Deployment)
//! - [`controller`] - Reconciliation engine and per-kind applications
//! - [`controller_runner`] - Wiring of the kube-rs controllers
//! - [`inheritance`] - Register inheritance rules
//! - [`identity`] - Hierarchical `<organization>.<deployment>` names
//! - [`registry`] - Register lookups and registry backend discovery
//! - [`store`] - Persisted resource access
//! - [`namespace`] - Organization namespace provisioning
//! - [`retry`] - Backoff for startup API calls
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod error;
pub mod identity;
pub mod inheritance;
pub mod namespace;
pub mod registry;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "org-registry-controller";

/// Namespace the registry backends run in
pub const CONTROL_NAMESPACE: &str = "ndd-system";
