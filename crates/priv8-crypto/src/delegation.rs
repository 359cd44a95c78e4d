//! Capacity delegation
//!
//! An owner holding a rate-limited capacity credit can let other identities
//! spend it. The grant is a canonical JSON statement signed by the owner:
//! who delegates, to whom, how many uses, on which credit, until when.
//!
//! The key network is the only party that enforces a delegation (signature,
//! expiry, delegatee membership and the use ceiling). This module issues
//! grants; [`CapacityDelegation::verify`] exists for consumers that want to
//! check one independently.

use crate::{
    identity::{Address, AuthSig, IdentitySigner},
    resources::{Ability, LitResource, ResourceAbilityRequest},
    CryptoError, Result,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Version of the delegation statement format
pub const DELEGATION_VERSION: u8 = 1;

/// The statement an owner signs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationStatement {
    pub version: u8,
    pub owner: Address,
    /// Sorted, so the serialized form is canonical
    pub delegatees: BTreeSet<Address>,
    pub max_uses: u64,
    /// Capacity credit token id
    pub resource_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DelegationStatement {
    /// Canonical serialized form; this is exactly what gets signed
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The credit resource this statement spends
    pub fn resource(&self) -> LitResource {
        LitResource::rate_limit_increase(self.resource_id.clone())
    }
}

/// A signed, bounded-use grant of an owner's capacity to delegatees
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityDelegation {
    statement: DelegationStatement,
    owner_signature: AuthSig,
}

impl CapacityDelegation {
    pub fn statement(&self) -> &DelegationStatement {
        &self.statement
    }

    /// The exact bytes the owner signed
    pub fn statement_bytes(&self) -> &[u8] {
        self.owner_signature.signed_message.as_bytes()
    }

    pub fn owner(&self) -> Address {
        self.statement.owner
    }

    pub fn delegatees(&self) -> &BTreeSet<Address> {
        &self.statement.delegatees
    }

    pub fn max_uses(&self) -> u64 {
        self.statement.max_uses
    }

    pub fn resource_id(&self) -> &str {
        &self.statement.resource_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.statement.expires_at
    }

    /// The owner's signature envelope, as submitted to the network
    pub fn auth_sig(&self) -> &AuthSig {
        &self.owner_signature
    }

    /// The resource/ability pair a session funded by this grant exercises
    pub fn resource_ability(&self) -> ResourceAbilityRequest {
        ResourceAbilityRequest::new(self.statement.resource(), Ability::RateLimitIncreaseAuth)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.statement.expires_at <= now
    }

    pub fn is_delegatee(&self, address: &Address) -> bool {
        self.statement.delegatees.contains(address)
    }

    /// Check the owner signature against the canonical statement
    pub fn verify(&self) -> Result<()> {
        if self.statement_bytes() != self.statement.canonical_bytes()?.as_slice() {
            return Err(CryptoError::InvalidSignature(
                "signed message does not match delegation statement".to_string(),
            ));
        }
        if self.owner_signature.address != self.statement.owner {
            return Err(CryptoError::InvalidSignature(
                "signature envelope names a different owner".to_string(),
            ));
        }
        self.owner_signature.verify()
    }
}

/// Issues capacity delegations for one capacity credit
#[derive(Clone, Debug)]
pub struct CapacityDelegationIssuer {
    resource_id: String,
}

impl CapacityDelegationIssuer {
    /// Issuer for the capacity credit identified by `resource_id`
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Issue a delegation valid for `ttl` from now
    ///
    /// All arguments are checked before the owner is asked to sign.
    pub async fn issue(
        &self,
        owner: &dyn IdentitySigner,
        delegatees: impl IntoIterator<Item = Address>,
        max_uses: u64,
        ttl: Duration,
    ) -> Result<CapacityDelegation> {
        if ttl <= Duration::zero() {
            return Err(CryptoError::InvalidTtl(ttl.num_seconds()));
        }
        let delegatees: BTreeSet<Address> = delegatees.into_iter().collect();
        if delegatees.is_empty() {
            return Err(CryptoError::EmptyDelegateeSet);
        }
        if max_uses == 0 {
            return Err(CryptoError::InvalidMaxUses(max_uses));
        }

        let issued_at = Utc::now();
        let statement = DelegationStatement {
            version: DELEGATION_VERSION,
            owner: owner.address(),
            delegatees,
            max_uses,
            resource_id: self.resource_id.clone(),
            issued_at,
            expires_at: issued_at + ttl,
        };
        let message = String::from_utf8(statement.canonical_bytes()?)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let owner_signature = AuthSig::sign(owner, message).await?;

        info!(
            owner = %statement.owner,
            delegatees = statement.delegatees.len(),
            max_uses,
            expires_at = %statement.expires_at,
            "issued capacity delegation"
        );

        Ok(CapacityDelegation {
            statement,
            owner_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{LocalWallet, Signature};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSigner {
        inner: LocalWallet,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentitySigner for CountingSigner {
        fn address(&self) -> Address {
            self.inner.address()
        }

        async fn sign(&self, message: &[u8]) -> Result<Signature> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(message).await
        }
    }

    fn counting() -> CountingSigner {
        CountingSigner {
            inner: LocalWallet::random(),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let owner = LocalWallet::random();
        let delegatee = LocalWallet::random().address();
        let issuer = CapacityDelegationIssuer::new("1234");

        let delegation = issuer
            .issue(&owner, [delegatee], 10, Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(delegation.owner(), owner.address());
        assert!(delegation.is_delegatee(&delegatee));
        assert_eq!(delegation.max_uses(), 10);
        assert_eq!(delegation.resource_id(), "1234");
        assert!(!delegation.is_expired_at(Utc::now()));
        assert_eq!(delegation.statement_bytes(), delegation.statement().canonical_bytes().unwrap());
        assert!(delegation.verify().is_ok());

        let spend = delegation.resource_ability();
        assert_eq!(spend.resource, LitResource::rate_limit_increase("1234"));
        assert_eq!(spend.ability, Ability::RateLimitIncreaseAuth);
        assert!(spend.is_well_formed());
    }

    #[tokio::test]
    async fn test_tampered_delegation_fails_verification() {
        let owner = LocalWallet::random();
        let issuer = CapacityDelegationIssuer::new("1");
        let mut delegation = issuer
            .issue(&owner, [LocalWallet::random().address()], 1, Duration::minutes(5))
            .await
            .unwrap();
        delegation.statement.max_uses = 1000;
        assert!(delegation.verify().is_err());
    }

    #[tokio::test]
    async fn test_rejects_before_signing() {
        let owner = counting();
        let issuer = CapacityDelegationIssuer::new("1");
        let someone = LocalWallet::random().address();

        let err = issuer.issue(&owner, [someone], 1, Duration::zero()).await.unwrap_err();
        assert!(matches!(err, CryptoError::InvalidTtl(0)));

        let err = issuer.issue(&owner, [someone], 1, Duration::seconds(-5)).await.unwrap_err();
        assert!(matches!(err, CryptoError::InvalidTtl(-5)));

        let err = issuer.issue(&owner, Vec::new(), 1, Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, CryptoError::EmptyDelegateeSet));

        let err = issuer.issue(&owner, [someone], 0, Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, CryptoError::InvalidMaxUses(0)));

        assert_eq!(owner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delegatees_are_canonicalized() {
        let owner = LocalWallet::random();
        let a = LocalWallet::random().address();
        let b = LocalWallet::random().address();
        let issuer = CapacityDelegationIssuer::new("7");

        let d = issuer.issue(&owner, [b, a, b], 3, Duration::hours(1)).await.unwrap();
        assert_eq!(d.delegatees().len(), 2);
        let json = serde_json::to_string(&d).unwrap();
        let parsed: CapacityDelegation = serde_json::from_str(&json).unwrap();
        assert!(parsed.verify().is_ok());
    }
}
