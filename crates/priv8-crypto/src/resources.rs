//! Resources and the abilities a session may exercise on them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard resource key
pub const WILDCARD: &str = "*";

/// An action that can be authorized on a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ability {
    /// Decrypt data gated by access control conditions
    AccessControlConditionDecryption,
    /// Sign data gated by access control conditions
    AccessControlConditionSigning,
    /// Spend a capacity credit
    RateLimitIncreaseAuth,
}

impl Ability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessControlConditionDecryption => "access-control-condition-decryption",
            Self::AccessControlConditionSigning => "access-control-condition-signing",
            Self::RateLimitIncreaseAuth => "rate-limit-increase-auth",
        }
    }

    /// The resource kind this ability applies to
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::AccessControlConditionDecryption | Self::AccessControlConditionSigning => {
                ResourceKind::AccessControlCondition
            }
            Self::RateLimitIncreaseAuth => ResourceKind::RateLimitIncrease,
        }
    }

    /// ReCap namespace and action name
    pub fn recap_action(&self) -> (&'static str, &'static str) {
        match self {
            Self::AccessControlConditionDecryption => ("Threshold", "Decryption"),
            Self::AccessControlConditionSigning => ("Threshold", "Signing"),
            Self::RateLimitIncreaseAuth => ("Auth", "Auth"),
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource families known to the key network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    AccessControlCondition,
    RateLimitIncrease,
}

impl ResourceKind {
    /// URI scheme prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::AccessControlCondition => "lit-accesscontrolcondition",
            Self::RateLimitIncrease => "lit-ratelimitincrease",
        }
    }
}

/// A concrete resource, addressed by kind and key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LitResource {
    pub kind: ResourceKind,
    pub key: String,
}

impl LitResource {
    /// Resource for a payload: `<conditionsHash>/<dataToEncryptHash>`
    pub fn access_control_condition(conditions_hash: &str, data_hash: &str) -> Self {
        Self {
            kind: ResourceKind::AccessControlCondition,
            key: format!("{}/{}", conditions_hash, data_hash),
        }
    }

    /// Resource for a capacity credit token
    pub fn rate_limit_increase(token_id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::RateLimitIncrease,
            key: token_id.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.key == WILDCARD
    }

    /// `<prefix>://<key>`
    pub fn uri(&self) -> String {
        format!("{}://{}", self.kind.prefix(), self.key)
    }

    /// Whether `self`, as a granted resource, covers `requested`
    pub fn covers(&self, requested: &LitResource) -> bool {
        self.kind == requested.kind && (self.is_wildcard() || self.key == requested.key)
    }
}

impl fmt::Display for LitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// A (resource, ability) pair
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAbilityRequest {
    pub resource: LitResource,
    pub ability: Ability,
}

impl ResourceAbilityRequest {
    pub fn new(resource: LitResource, ability: Ability) -> Self {
        Self { resource, ability }
    }

    /// Decryption of a specific payload
    pub fn decryption(resource: LitResource) -> Self {
        Self::new(resource, Ability::AccessControlConditionDecryption)
    }

    /// Whether the pair is internally consistent (ability fits the resource)
    pub fn is_well_formed(&self) -> bool {
        self.ability.resource_kind() == self.resource.kind
    }

    /// Whether any granted pair covers this request
    pub fn is_covered_by<'a>(&self, granted: impl IntoIterator<Item = &'a ResourceAbilityRequest>) -> bool {
        granted
            .into_iter()
            .any(|g| g.ability == self.ability && g.resource.covers(&self.resource))
    }
}
