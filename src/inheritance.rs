//! Register inheritance
//!
//! A child's explicit bindings always win; the parent only fills kinds the
//! child leaves open. The allocation strategy is inherited wholesale: a
//! non-empty child value replaces the parent's entirely.

use crate::crd::{AddressAllocationStrategy, RegisterKind, RegisterMap};
use crate::Error;

/// Outcome of a resolution pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Merged register bindings
    pub register: RegisterMap,
    /// Strategy after inheritance
    pub strategy: Option<AddressAllocationStrategy>,
}

/// Merge a child's desired state with its parent's resolved state and
/// validate the result.
pub fn resolve(
    child_register: &RegisterMap,
    child_strategy: Option<&AddressAllocationStrategy>,
    parent_register: &RegisterMap,
    parent_strategy: Option<&AddressAllocationStrategy>,
) -> Result<Resolution, Error> {
    let mut register = child_register.clone();
    for (kind, name) in parent_register {
        register.entry(*kind).or_insert_with(|| name.clone());
    }

    let strategy = match child_strategy {
        Some(strategy) if !strategy.is_empty() => Some(strategy.clone()),
        _ => parent_strategy.filter(|s| !s.is_empty()).cloned(),
    };

    validate_mandatory(&register)?;

    Ok(Resolution { register, strategy })
}

/// Resolution for a resource without a parent.
///
/// Nothing is inherited and mandatory kinds are not enforced here; lookups
/// enforce them instead.
pub fn resolve_root(
    register: &RegisterMap,
    strategy: Option<&AddressAllocationStrategy>,
) -> Resolution {
    Resolution {
        register: register.clone(),
        strategy: strategy.filter(|s| !s.is_empty()).cloned(),
    }
}

/// Fail with the first mandatory kind missing from `register`
pub fn validate_mandatory(register: &RegisterMap) -> Result<(), Error> {
    match RegisterKind::MANDATORY
        .iter()
        .find(|kind| !register.contains_key(kind))
    {
        Some(kind) => Err(Error::CriticalRegisterMissing { kind: *kind }),
        None => Ok(()),
    }
}
