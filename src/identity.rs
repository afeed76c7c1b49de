//! Hierarchical resource names
//!
//! A single string encodes an organization and, optionally, one of its
//! deployments: `acme` addresses the organization, `acme.dep1` addresses the
//! deployment `dep1` of `acme`. All call sites decode through
//! [`HierarchicalName::parse`].

use std::fmt;

use crate::Error;

const SEPARATOR: char = '.';

/// Decoded organization/deployment identity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HierarchicalName {
    organization: String,
    deployment: Option<String>,
}

impl HierarchicalName {
    /// Identity of an organization
    pub fn organization_only(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            deployment: None,
        }
    }

    /// Identity of a deployment within an organization
    pub fn deployment_of(organization: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            deployment: Some(deployment.into()),
        }
    }

    /// Decode an encoded name.
    ///
    /// Empty segments and more than two segments are rejected.
    pub fn parse(encoded: &str) -> Result<Self, Error> {
        let mut segments = encoded.split(SEPARATOR);
        let organization = segments.next().unwrap_or_default();
        let deployment = segments.next();

        if segments.next().is_some() {
            return Err(Error::validation(
                encoded,
                "hierarchical name has more than two segments",
            ));
        }
        if organization.is_empty() {
            return Err(Error::validation(
                encoded,
                "hierarchical name has an empty organization segment",
            ));
        }

        match deployment {
            None => Ok(Self::organization_only(organization)),
            Some("") => Err(Error::validation(
                encoded,
                "hierarchical name has an empty deployment segment",
            )),
            Some(deployment) => Ok(Self::deployment_of(organization, deployment)),
        }
    }

    /// Organization segment
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Deployment segment, if any
    pub fn deployment(&self) -> Option<&str> {
        self.deployment.as_deref()
    }

    /// True when the name addresses a deployment
    pub fn is_deployment(&self) -> bool {
        self.deployment.is_some()
    }
}

impl fmt::Display for HierarchicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.deployment {
            Some(deployment) => write!(f, "{}{}{}", self.organization, SEPARATOR, deployment),
            None => f.write_str(&self.organization),
        }
    }
}

impl std::str::FromStr for HierarchicalName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
