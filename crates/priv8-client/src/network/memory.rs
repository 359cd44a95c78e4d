//! In-process key network for testing and offline runs
//!
//! Behaves like the real network from the client's point of view: nonces
//! come from an advancing block counter, session requests are checked
//! against the signed statement, sessions are signed by a set of node keys
//! and decryption re-evaluates the conditions against a balance table.
//! Failures are reported with the same node error codes the relay uses.

use super::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyNetwork, NetworkInfo,
    NodeErrorBody, NodeSignature, SessionSigs, SessionSigsRequest, SessionSigsResponse,
    ERR_CAPACITY_EXHAUSTED, ERR_CONDITIONS_NOT_MET, ERR_INVALID_AUTH_SIG, ERR_INVALID_CONDITIONS,
    ERR_INVALID_DELEGATION, ERR_SESSION_REJECTED,
};
use crate::{ClientError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use priv8_crypto::{
    conditions::USER_ADDRESS_PARAM,
    siwe::{self, RECAP_PREFIX},
    Address, AuthSig, CapacityDelegation, ConditionSet, CryptoError, IdentitySigner, LitResource,
    LocalWallet, ResourceAbilityRequest, SymmetricKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const NODE_DERIVED_VIA: &str = "priv8.node.sign";
const NODE_ALGO: &str = "ecdsa-secp256k1";
// Block heights a nonce stays redeemable for after it was issued
const NONCE_WINDOW: u64 = 256;

type NodeResult<T> = std::result::Result<T, NodeErrorBody>;

/// What every node signs when it grants a session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionGrant {
    session_key: String,
    network: String,
    address: Address,
    chain: String,
    granted: Vec<ResourceAbilityRequest>,
    expiration: DateTime<Utc>,
}

struct Inner {
    network: String,
    key: SymmetricKey,
    nodes: Vec<LocalWallet>,
    threshold: usize,
    block_height: AtomicU64,
    // blockhash -> height, removed once redeemed
    issued_nonces: DashMap<String, u64>,
    // (chain, address) -> wei
    balances: DashMap<(String, Address), String>,
    // owner signature -> uses consumed
    delegation_uses: DashMap<String, u64>,
    require_capacity: AtomicBool,
    unreachable: AtomicBool,
    connect_requests: AtomicUsize,
    encrypt_requests: AtomicUsize,
    session_requests: AtomicUsize,
    decrypt_requests: AtomicUsize,
}

/// A simulated key network held in memory
#[derive(Clone)]
pub struct MemoryKeyNetwork {
    inner: Arc<Inner>,
}

impl Default for MemoryKeyNetwork {
    fn default() -> Self {
        Self::new("datil-dev")
    }
}

impl std::fmt::Debug for MemoryKeyNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyNetwork")
            .field("network", &self.inner.network)
            .field("nodes", &self.inner.nodes.len())
            .field("threshold", &self.inner.threshold)
            .finish_non_exhaustive()
    }
}

impl MemoryKeyNetwork {
    /// Three nodes, two of which must sign a session
    pub fn new(network: impl Into<String>) -> Self {
        Self::with_nodes(network, 3, 2)
    }

    /// Create with `node_count` node keys and a signing `threshold`
    pub fn with_nodes(network: impl Into<String>, node_count: usize, threshold: usize) -> Self {
        let node_count = node_count.max(1);
        Self {
            inner: Arc::new(Inner {
                network: network.into(),
                key: SymmetricKey::generate(),
                nodes: (0..node_count).map(|_| LocalWallet::random()).collect(),
                threshold: threshold.clamp(1, node_count),
                block_height: AtomicU64::new(0),
                issued_nonces: DashMap::new(),
                balances: DashMap::new(),
                delegation_uses: DashMap::new(),
                require_capacity: AtomicBool::new(false),
                unreachable: AtomicBool::new(false),
                connect_requests: AtomicUsize::new(0),
                encrypt_requests: AtomicUsize::new(0),
                session_requests: AtomicUsize::new(0),
                decrypt_requests: AtomicUsize::new(0),
            }),
        }
    }

    /// Set the native balance of `address` on `chain`, in wei
    pub fn set_balance(&self, chain: &str, address: Address, wei: impl Into<String>) {
        self.inner.balances.insert((chain.to_string(), address), wei.into());
    }

    /// Refuse sessions that are not funded by a capacity delegation
    pub fn set_require_capacity(&self, required: bool) {
        self.inner.require_capacity.store(required, Ordering::SeqCst);
    }

    /// Simulate the network being down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn connect_requests(&self) -> usize {
        self.inner.connect_requests.load(Ordering::SeqCst)
    }

    pub fn encrypt_requests(&self) -> usize {
        self.inner.encrypt_requests.load(Ordering::SeqCst)
    }

    pub fn session_requests(&self) -> usize {
        self.inner.session_requests.load(Ordering::SeqCst)
    }

    pub fn decrypt_requests(&self) -> usize {
        self.inner.decrypt_requests.load(Ordering::SeqCst)
    }

    /// Uses consumed so far under `delegation`
    pub fn delegation_uses(&self, delegation: &CapacityDelegation) -> u64 {
        self.inner
            .delegation_uses
            .get(&delegation.auth_sig().sig)
            .map(|uses| *uses)
            .unwrap_or(0)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkUnreachable(format!(
                "{} nodes did not respond",
                self.inner.network
            )));
        }
        Ok(())
    }

    fn balance(&self, chain: &str, address: &Address) -> String {
        self.inner
            .balances
            .get(&(chain.to_string(), *address))
            .map(|wei| wei.clone())
            .unwrap_or_else(|| "0".to_string())
    }

    fn aad(conditions_hash: &str, data_hash: &str) -> Vec<u8> {
        format!("{}/{}", conditions_hash, data_hash).into_bytes()
    }

    fn validate_conditions(conditions: &ConditionSet) -> NodeResult<String> {
        conditions
            .validate()
            .and_then(|_| conditions.hash())
            .map_err(|e| NodeErrorBody::new(ERR_INVALID_CONDITIONS, e.to_string()))
    }

    fn evaluate_conditions(&self, conditions: &ConditionSet, user: &Address) -> NodeResult<()> {
        for condition in conditions.iter() {
            let value = match condition.method.as_str() {
                "eth_getBalance" => {
                    let target = match condition.parameters.first().map(String::as_str) {
                        None | Some(USER_ADDRESS_PARAM) => *user,
                        Some(literal) => literal
                            .parse::<Address>()
                            .map_err(|e| NodeErrorBody::new(ERR_INVALID_CONDITIONS, e.to_string()))?,
                    };
                    self.balance(&condition.chain, &target)
                }
                other => {
                    return Err(NodeErrorBody::new(
                        ERR_INVALID_CONDITIONS,
                        format!("unsupported method {}", other),
                    ))
                }
            };

            let satisfied = condition
                .is_satisfied_by(&value)
                .map_err(|e| NodeErrorBody::new(ERR_INVALID_CONDITIONS, e.to_string()))?;
            if !satisfied {
                return Err(NodeErrorBody::new(
                    ERR_CONDITIONS_NOT_MET,
                    format!(
                        "{} for {} on {} is not {} {}",
                        condition.method,
                        user,
                        condition.chain,
                        condition.return_value_test.comparator,
                        condition.threshold()
                    ),
                ));
            }
        }
        Ok(())
    }

    // Everything the signed statement must agree with. Returns the
    // statement's expiration.
    fn check_statement(&self, request: &SessionSigsRequest, now: DateTime<Utc>) -> NodeResult<DateTime<Utc>> {
        let auth_sig = &request.auth_sig;
        auth_sig
            .verify()
            .map_err(|e| NodeErrorBody::new(ERR_INVALID_AUTH_SIG, e.to_string()))?;

        let message = auth_sig.signed_message.as_str();
        let nonce = siwe::message_field(message, "Nonce")
            .ok_or_else(|| NodeErrorBody::new(ERR_INVALID_AUTH_SIG, "statement has no nonce"))?;
        // Redeeming the nonce makes the signed statement single-use
        if self.inner.issued_nonces.remove(nonce).is_none() {
            return Err(NodeErrorBody::new(
                ERR_INVALID_AUTH_SIG,
                "nonce was not issued by this network or was already used",
            ));
        }

        if siwe::message_field(message, "URI").map_or(true, |uri| uri.trim().is_empty()) {
            return Err(NodeErrorBody::new(ERR_INVALID_AUTH_SIG, "statement has no URI"));
        }

        if let Some(expected) = siwe::chain_id(&request.chain) {
            let signed = siwe::message_field(message, "Chain ID").and_then(|id| id.parse::<u64>().ok());
            if signed != Some(expected) {
                return Err(NodeErrorBody::new(
                    ERR_INVALID_AUTH_SIG,
                    format!("statement is not for chain {}", request.chain),
                ));
            }
        }

        let expiration = siwe::message_field(message, "Expiration Time")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| NodeErrorBody::new(ERR_INVALID_AUTH_SIG, "statement has no expiration"))?;
        if expiration <= now {
            return Err(NodeErrorBody::new(ERR_INVALID_AUTH_SIG, "statement has expired"));
        }

        if request.resource_ability_requests.is_empty()
            || !request.resource_ability_requests.iter().all(|r| r.is_well_formed())
        {
            return Err(NodeErrorBody::new(ERR_SESSION_REJECTED, "invalid resource ability requests"));
        }
        let recap = siwe::recap_uri(&request.resource_ability_requests)
            .map_err(|e| NodeErrorBody::new(ERR_SESSION_REJECTED, e.to_string()))?;
        let signed_recap = message
            .lines()
            .find_map(|line| line.strip_prefix("- ").filter(|r| r.starts_with(RECAP_PREFIX)));
        if signed_recap != Some(recap.as_str()) {
            return Err(NodeErrorBody::new(
                ERR_INVALID_AUTH_SIG,
                "requested abilities differ from the signed statement",
            ));
        }

        Ok(expiration)
    }

    fn consume_capacity(&self, request: &SessionSigsRequest, user: &Address, now: DateTime<Utc>) -> NodeResult<()> {
        let Some(delegation) = request.capacity_delegation.as_ref() else {
            if self.inner.require_capacity.load(Ordering::SeqCst) {
                return Err(NodeErrorBody::new(ERR_INVALID_DELEGATION, "capacity delegation required"));
            }
            return Ok(());
        };

        delegation
            .verify()
            .map_err(|e| NodeErrorBody::new(ERR_INVALID_DELEGATION, e.to_string()))?;
        if delegation.is_expired_at(now) {
            return Err(NodeErrorBody::new(ERR_INVALID_DELEGATION, "delegation has expired"));
        }
        if !request.resource_ability_requests.contains(&delegation.resource_ability()) {
            return Err(NodeErrorBody::new(
                ERR_INVALID_DELEGATION,
                format!("statement does not ask to spend credit {}", delegation.resource_id()),
            ));
        }
        if !delegation.is_delegatee(user) {
            return Err(NodeErrorBody::new(
                ERR_INVALID_DELEGATION,
                format!("{} is not a delegatee", user),
            ));
        }

        let mut uses = self
            .inner
            .delegation_uses
            .entry(delegation.auth_sig().sig.clone())
            .or_insert(0);
        if *uses >= delegation.max_uses() {
            return Err(NodeErrorBody::new(
                ERR_CAPACITY_EXHAUSTED,
                format!("{} of {} uses consumed", *uses, delegation.max_uses()),
            ));
        }
        *uses += 1;
        Ok(())
    }

    // Valid node signatures must reach the threshold and agree on one grant.
    fn verify_session(&self, sigs: &SessionSigs) -> NodeResult<SessionGrant> {
        let mut signed_message: Option<&str> = None;
        let mut valid = 0usize;

        for node in &self.inner.nodes {
            let address = node.address();
            let Some(node_sig) = sigs.get(&address.to_checksum()) else {
                continue;
            };
            let envelope = AuthSig {
                sig: node_sig.sig.clone(),
                derived_via: node_sig.derived_via.clone(),
                signed_message: node_sig.signed_message.clone(),
                address,
            };
            if envelope.verify().is_err() {
                continue;
            }
            match signed_message {
                Some(existing) if existing != node_sig.signed_message => {
                    return Err(NodeErrorBody::new(ERR_SESSION_REJECTED, "nodes signed different sessions"));
                }
                _ => signed_message = Some(node_sig.signed_message.as_str()),
            }
            valid += 1;
        }

        if valid < self.inner.threshold {
            return Err(NodeErrorBody::new(
                ERR_SESSION_REJECTED,
                format!("{} valid node signatures, {} required", valid, self.inner.threshold),
            ));
        }
        let message = signed_message
            .ok_or_else(|| NodeErrorBody::new(ERR_SESSION_REJECTED, "no session signatures"))?;
        let grant: SessionGrant = serde_json::from_str(message)
            .map_err(|e| NodeErrorBody::new(ERR_SESSION_REJECTED, e.to_string()))?;
        if grant.network != self.inner.network {
            return Err(NodeErrorBody::new(ERR_SESSION_REJECTED, "session belongs to another network"));
        }
        Ok(grant)
    }

    fn open(&self, request: &DecryptRequest, conditions_hash: &str) -> Result<Vec<u8>> {
        let sealed = STANDARD.decode(&request.ciphertext).map_err(CryptoError::from)?;
        let plaintext = self
            .inner
            .key
            .open(&sealed, &Self::aad(conditions_hash, &request.data_to_encrypt_hash))?;
        if hex::encode(Sha256::digest(&plaintext)) != request.data_to_encrypt_hash {
            return Err(CryptoError::Decryption("plaintext does not match dataToEncryptHash".to_string()).into());
        }
        Ok(plaintext)
    }
}

#[async_trait]
impl KeyNetwork for MemoryKeyNetwork {
    async fn connect(&self) -> Result<NetworkInfo> {
        self.check_reachable()?;
        self.inner.connect_requests.fetch_add(1, Ordering::SeqCst);
        Ok(NetworkInfo {
            network: self.inner.network.clone(),
            node_count: self.inner.nodes.len(),
            threshold: self.inner.threshold,
        })
    }

    async fn latest_blockhash(&self) -> Result<String> {
        self.check_reachable()?;
        let height = self.inner.block_height.fetch_add(1, Ordering::SeqCst) + 1;
        let mut hasher = Sha256::new();
        hasher.update(self.inner.network.as_bytes());
        hasher.update(height.to_be_bytes());
        let blockhash = format!("0x{}", hex::encode(hasher.finalize()));
        self.inner.issued_nonces.insert(blockhash.clone(), height);
        self.inner
            .issued_nonces
            .retain(|_, issued| issued.saturating_add(NONCE_WINDOW) > height);
        debug!(height, %blockhash, "issued blockhash");
        Ok(blockhash)
    }

    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        self.check_reachable()?;
        self.inner.encrypt_requests.fetch_add(1, Ordering::SeqCst);

        let conditions_hash =
            Self::validate_conditions(&request.access_control_conditions).map_err(NodeErrorBody::into_client_error)?;
        let plaintext = STANDARD.decode(&request.data_to_encrypt).map_err(CryptoError::from)?;
        let data_hash = hex::encode(Sha256::digest(&plaintext));
        let sealed = self.inner.key.seal(&plaintext, &Self::aad(&conditions_hash, &data_hash))?;

        Ok(EncryptResponse {
            ciphertext: STANDARD.encode(sealed),
            data_to_encrypt_hash: data_hash,
        })
    }

    async fn session_sigs(&self, request: SessionSigsRequest) -> Result<SessionSigsResponse> {
        self.check_reachable()?;
        self.inner.session_requests.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let user = request.auth_sig.address;

        let signed_expiration = self.check_statement(&request, now).map_err(NodeErrorBody::into_client_error)?;
        self.consume_capacity(&request, &user, now)
            .map_err(NodeErrorBody::into_client_error)?;

        let mut expiration = signed_expiration.min(request.expiration);
        if let Some(delegation) = &request.capacity_delegation {
            expiration = expiration.min(delegation.expires_at());
        }

        let grant = SessionGrant {
            session_key: uuid::Uuid::new_v4().to_string(),
            network: self.inner.network.clone(),
            address: user,
            chain: request.chain.clone(),
            granted: request.resource_ability_requests.clone(),
            expiration,
        };
        let message = serde_json::to_string(&grant).map_err(CryptoError::from)?;

        let mut session_sigs = SessionSigs::new();
        for node in &self.inner.nodes {
            let signed = AuthSig::sign(node, message.clone()).await?;
            session_sigs.insert(
                node.address().to_checksum(),
                NodeSignature {
                    sig: signed.sig,
                    derived_via: NODE_DERIVED_VIA.to_string(),
                    signed_message: signed.signed_message,
                    address: node.address().to_checksum(),
                    algo: Some(NODE_ALGO.to_string()),
                },
            );
        }
        debug!(address = %user, abilities = grant.granted.len(), %expiration, "granted session");

        Ok(SessionSigsResponse {
            session_sigs,
            granted: grant.granted,
            expiration,
        })
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        self.check_reachable()?;
        self.inner.decrypt_requests.fetch_add(1, Ordering::SeqCst);

        let conditions = &request.access_control_conditions;
        let conditions_hash = Self::validate_conditions(conditions).map_err(NodeErrorBody::into_client_error)?;
        if conditions.chain()? != request.chain {
            return Err(NodeErrorBody::new(
                ERR_INVALID_CONDITIONS,
                format!("conditions are not evaluated on {}", request.chain),
            )
            .into_client_error());
        }

        let grant = self.verify_session(&request.session_sigs).map_err(NodeErrorBody::into_client_error)?;
        if grant.expiration <= Utc::now() {
            return Err(NodeErrorBody::new(ERR_SESSION_REJECTED, "session has expired").into_client_error());
        }
        let needed = ResourceAbilityRequest::decryption(LitResource::access_control_condition(
            &conditions_hash,
            &request.data_to_encrypt_hash,
        ));
        if !needed.is_covered_by(&grant.granted) {
            return Err(NodeErrorBody::new(
                ERR_SESSION_REJECTED,
                format!("session does not grant {} on {}", needed.ability.as_str(), needed.resource),
            )
            .into_client_error());
        }

        self.evaluate_conditions(conditions, &grant.address)
            .map_err(NodeErrorBody::into_client_error)?;
        let plaintext = self.open(&request, &conditions_hash)?;
        debug!(address = %grant.address, size = plaintext.len(), "decrypted payload");

        Ok(DecryptResponse {
            decrypted_data: STANDARD.encode(plaintext),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use priv8_crypto::{Condition, SignInStatement};

    async fn signed_request(
        network: &MemoryKeyNetwork,
        wallet: &LocalWallet,
        requests: Vec<ResourceAbilityRequest>,
    ) -> SessionSigsRequest {
        let nonce = network.latest_blockhash().await.unwrap();
        let expiration = Utc::now() + chrono::Duration::minutes(10);
        let statement = SignInStatement::builder(wallet.address(), nonce)
            .uri("lit:session:test")
            .expiration(expiration)
            .resource_ability_requests(requests.clone())
            .build()
            .unwrap();
        SessionSigsRequest {
            chain: "ethereum".to_string(),
            auth_sig: AuthSig::sign(wallet, statement.to_message().unwrap()).await.unwrap(),
            resource_ability_requests: requests,
            expiration,
            capacity_delegation: None,
        }
    }

    fn payload_decryption() -> Vec<ResourceAbilityRequest> {
        vec![ResourceAbilityRequest::decryption(LitResource::access_control_condition("cond", "data"))]
    }

    #[tokio::test]
    async fn test_blockhash_advances() {
        let network = MemoryKeyNetwork::default();
        let a = network.latest_blockhash().await.unwrap();
        let b = network.latest_blockhash().await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_encrypt_is_not_deterministic() {
        let network = MemoryKeyNetwork::default();
        let request = EncryptRequest {
            access_control_conditions: ConditionSet::single(Condition::native_balance_at_least("ethereum", "1")),
            data_to_encrypt: STANDARD.encode(b"same"),
        };
        let a = network.encrypt(request.clone()).await.unwrap();
        let b = network.encrypt(request).await.unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(a.data_to_encrypt_hash, b.data_to_encrypt_hash);
    }

    #[tokio::test]
    async fn test_unissued_nonce_rejected() {
        let network = MemoryKeyNetwork::default();
        let other = MemoryKeyNetwork::default();
        let wallet = LocalWallet::random();
        let request = signed_request(&other, &wallet, payload_decryption()).await;
        assert!(matches!(
            network.session_sigs(request).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_replayed_statement_rejected() {
        let network = MemoryKeyNetwork::default();
        let wallet = LocalWallet::random();
        let request = signed_request(&network, &wallet, payload_decryption()).await;
        network.session_sigs(request.clone()).await.unwrap();
        assert!(matches!(
            network.session_sigs(request).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
        assert_eq!(network.session_requests(), 2);
    }

    #[tokio::test]
    async fn test_delegated_session_must_request_credit() {
        let network = MemoryKeyNetwork::default();
        let wallet = LocalWallet::random();
        let owner = LocalWallet::random();
        let delegation = priv8_crypto::CapacityDelegationIssuer::new("7")
            .issue(&owner, [wallet.address()], 5, chrono::Duration::hours(1))
            .await
            .unwrap();

        let mut unfunded = signed_request(&network, &wallet, payload_decryption()).await;
        unfunded.capacity_delegation = Some(delegation.clone());
        assert!(matches!(
            network.session_sigs(unfunded).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
        assert_eq!(network.delegation_uses(&delegation), 0);

        let mut requests = payload_decryption();
        requests.push(delegation.resource_ability());
        let mut funded = signed_request(&network, &wallet, requests).await;
        funded.capacity_delegation = Some(delegation.clone());
        network.session_sigs(funded).await.unwrap();
        assert_eq!(network.delegation_uses(&delegation), 1);
    }

    #[tokio::test]
    async fn test_stale_nonce_expires() {
        let network = MemoryKeyNetwork::default();
        let wallet = LocalWallet::random();
        let request = signed_request(&network, &wallet, payload_decryption()).await;
        for _ in 0..NONCE_WINDOW {
            network.latest_blockhash().await.unwrap();
        }
        assert!(network.inner.issued_nonces.len() <= NONCE_WINDOW as usize);
        assert!(matches!(
            network.session_sigs(request).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_abilities_must_match_statement() {
        let network = MemoryKeyNetwork::default();
        let wallet = LocalWallet::random();
        let mut request = signed_request(&network, &wallet, payload_decryption()).await;
        request.resource_ability_requests = vec![ResourceAbilityRequest::decryption(
            LitResource::access_control_condition("other", "data"),
        )];
        assert!(matches!(
            network.session_sigs(request).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_session_signed_by_every_node() {
        let network = MemoryKeyNetwork::with_nodes("datil-dev", 4, 3);
        let wallet = LocalWallet::random();
        let request = signed_request(&network, &wallet, payload_decryption()).await;
        let response = network.session_sigs(request).await.unwrap();
        assert_eq!(response.session_sigs.len(), 4);
        assert!(network.verify_session(&response.session_sigs).is_ok());

        let mut partial = response.session_sigs.clone();
        let drop: Vec<String> = partial.keys().take(2).cloned().collect();
        for key in drop {
            partial.remove(&key);
        }
        assert_eq!(
            network.verify_session(&partial).unwrap_err().error_code,
            ERR_SESSION_REJECTED
        );
    }

    #[tokio::test]
    async fn test_capacity_required() {
        let network = MemoryKeyNetwork::default();
        network.set_require_capacity(true);
        let wallet = LocalWallet::random();
        let request = signed_request(&network, &wallet, payload_decryption()).await;
        assert!(matches!(
            network.session_sigs(request).await,
            Err(ClientError::AuthenticationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let network = MemoryKeyNetwork::default();
        network.set_unreachable(true);
        let err = network.latest_blockhash().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
