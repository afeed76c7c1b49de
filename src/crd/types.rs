//! Supporting types shared by the Organization and Deployment CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logical subsystem a register binds to
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// IP address management pools
    Ipam,
    /// Autonomous system numbers
    As,
    /// Network instances
    Ni,
    /// VLAN identifiers
    Vlan,
    /// Ethernet segment identifiers
    Esi,
    /// Route targets
    Rt,
}

impl RegisterKind {
    /// Kinds that must resolve for a resource to be usable
    pub const MANDATORY: [RegisterKind; 3] = [Self::Ipam, Self::As, Self::Ni];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipam => "ipam",
            Self::As => "as",
            Self::Ni => "ni",
            Self::Vlan => "vlan",
            Self::Esi => "esi",
            Self::Rt => "rt",
        }
    }
}

impl std::str::FromStr for RegisterKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipam" => Ok(Self::Ipam),
            "as" => Ok(Self::As),
            "ni" => Ok(Self::Ni),
            "vlan" => Ok(Self::Vlan),
            "esi" => Ok(Self::Esi),
            "rt" => Ok(Self::Rt),
            _ => Err(crate::Error::UnknownRegisterKind {
                kind: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved register bindings keyed by kind
pub type RegisterMap = BTreeMap<RegisterKind, String>;

/// A single register binding
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Register {
    /// Register kind
    pub kind: RegisterKind,
    /// Name of the backing register instance
    pub name: String,
}

impl Register {
    /// Create a register binding
    pub fn new(kind: RegisterKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Fold a register list into a map; later entries win for a repeated kind.
pub fn register_map(registers: &[Register]) -> RegisterMap {
    registers
        .iter()
        .map(|r| (r.kind, r.name.clone()))
        .collect()
}

/// Flatten a register map back into its persisted list form (ordered by kind)
pub fn register_list(map: &RegisterMap) -> Vec<Register> {
    map.iter()
        .map(|(kind, name)| Register::new(*kind, name.clone()))
        .collect()
}

/// Address allocation policy, inherited as a whole
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressAllocationStrategy {
    /// Allocation scheme (e.g. per-deployment, shared)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Prefix length handed out per allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<u8>,
}

impl AddressAllocationStrategy {
    /// Returns true if no field is set
    pub fn is_empty(&self) -> bool {
        self.type_.is_none() && self.prefix_length.is_none()
    }
}

/// Administrative state requested by the user
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// Resource takes part in resolution
    #[default]
    Enable,
    /// Resource is administratively down
    Disable,
}

/// Operational status of a resolved resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    /// Resolution succeeded
    Up,
    /// Resolution failed or the resource is disabled
    Down,
    /// Not resolved yet
    #[default]
    Unknown,
}

impl std::fmt::Display for OperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What happens to owned side effects when the resource is deleted
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Clean up owned side effects
    #[default]
    Delete,
    /// Leave owned side effects in place
    Orphan,
}

/// Whether the resource is meant to be acted upon
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPolicy {
    /// Resource is live
    #[default]
    Active,
    /// Resource is only planned
    Planned,
}

/// Lifecycle policy carried by both resource kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePolicy {
    /// Deletion behaviour
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Deployment behaviour
    #[serde(default)]
    pub deployment_policy: DeploymentPolicy,
}

/// Desired-state properties shared by both resource kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryProperties {
    /// Administrative state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_state: Option<AdminState>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit register bindings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub register: Vec<Register>,

    /// Address allocation strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_allocation_strategy: Option<AddressAllocationStrategy>,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Health summary
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// 100 when resolved and up, 0 otherwise
    pub percentage: u8,

    /// Why the resource is not healthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Observed state shared by both resource kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStatus {
    /// Conditions representing the resource state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Health summary
    #[serde(default)]
    pub health: HealthStatus,

    /// Register bindings after inheritance
    #[serde(default)]
    pub resolved_register: Vec<Register>,

    /// Allocation strategy after inheritance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_address_allocation_strategy: Option<AddressAllocationStrategy>,

    /// Operational status
    #[serde(default)]
    pub status: OperState,

    /// Reason for the current status; empty when up
    #[serde(default)]
    pub reason: String,

    /// Generation the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ResolvedStatus {
    /// Resolved register bindings as a map
    pub fn register(&self) -> RegisterMap {
        register_map(&self.resolved_register)
    }

    /// Add or replace a condition, keeping the transition time when the
    /// status did not change
    pub fn set_condition(&mut self, condition: Condition) {
        let previous = self
            .conditions
            .iter()
            .position(|c| c.type_ == condition.type_);
        match previous {
            Some(idx) if self.conditions[idx].status == condition.status => {
                let existing = &mut self.conditions[idx];
                existing.reason = condition.reason;
                existing.message = condition.message;
            }
            Some(idx) => self.conditions[idx] = condition,
            None => self.conditions.push(condition),
        }
    }
}
