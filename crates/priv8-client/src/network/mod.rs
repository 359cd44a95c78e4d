//! Threshold key-management network
//!
//! The network performs the actual distributed key operations. This crate
//! treats it as a single remote service: it prepares requests and interprets
//! responses, nothing more. [`HttpKeyNetwork`] talks to a relay over HTTP;
//! [`MemoryKeyNetwork`] simulates the whole network in process.

mod http;
mod memory;

pub use http::HttpKeyNetwork;
pub use memory::MemoryKeyNetwork;

use crate::{ClientError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use priv8_crypto::{AuthSig, CapacityDelegation, ConditionSet, CryptoError, ResourceAbilityRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node error code: the caller's on-chain state failed the conditions
pub const ERR_CONDITIONS_NOT_MET: &str = "NodeAccessControlConditionsReturnedNotAuthorized";
/// Node error code: the sign-in signature was rejected
pub const ERR_INVALID_AUTH_SIG: &str = "NodeInvalidAuthSig";
/// Node error code: the capacity delegation was rejected
pub const ERR_INVALID_DELEGATION: &str = "NodeInvalidCapacityDelegation";
/// Node error code: the capacity delegation's use ceiling was reached
pub const ERR_CAPACITY_EXHAUSTED: &str = "NodeCapacityExhausted";
/// Node error code: the session signatures were rejected
pub const ERR_SESSION_REJECTED: &str = "NodeSessionRejected";
/// Node error code: the conditions are not well-formed
pub const ERR_INVALID_CONDITIONS: &str = "NodeInvalidAccessControlConditions";

/// Handshake result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network: String,
    pub node_count: usize,
    pub threshold: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    pub access_control_conditions: ConditionSet,
    /// Plaintext, base64
    pub data_to_encrypt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
}

/// Signature from one node over the granted session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSignature {
    pub sig: String,
    pub derived_via: String,
    pub signed_message: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algo: Option<String>,
}

/// Session signatures keyed by node id
pub type SessionSigs = BTreeMap<String, NodeSignature>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSigsRequest {
    pub chain: String,
    /// Signed sign-in statement
    pub auth_sig: AuthSig,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
    pub expiration: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_delegation: Option<CapacityDelegation>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSigsResponse {
    pub session_sigs: SessionSigs,
    pub granted: Vec<ResourceAbilityRequest>,
    pub expiration: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub access_control_conditions: ConditionSet,
    pub chain: String,
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
    pub session_sigs: SessionSigs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    /// Plaintext, base64
    pub decrypted_data: String,
}

/// Error body returned by nodes
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeErrorBody {
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

impl NodeErrorBody {
    pub fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// Map a node error onto the client taxonomy
    pub fn into_client_error(self) -> ClientError {
        match self.error_code.as_str() {
            ERR_CONDITIONS_NOT_MET => ClientError::ConditionsNotMet(self.message),
            ERR_INVALID_AUTH_SIG | ERR_INVALID_DELEGATION | ERR_CAPACITY_EXHAUSTED | ERR_SESSION_REJECTED => {
                ClientError::AuthenticationRejected(format!("{}: {}", self.error_code, self.message))
            }
            ERR_INVALID_CONDITIONS => ClientError::Crypto(CryptoError::MalformedCondition(self.message)),
            other => ClientError::InvalidResponse(format!("{}: {}", other, self.message)),
        }
    }
}

/// Operations the core needs from the key network
#[async_trait]
pub trait KeyNetwork: Send + Sync {
    /// Handshake with the network
    async fn connect(&self) -> Result<NetworkInfo>;

    /// Freshness nonce for sign-in statements
    async fn latest_blockhash(&self) -> Result<String>;

    /// Encrypt under conditions; no session required
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse>;

    /// Exchange a signed sign-in statement for per-node session signatures
    async fn session_sigs(&self, request: SessionSigsRequest) -> Result<SessionSigsResponse>;

    /// Decrypt, subject to session and condition checks on the nodes
    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse>;
}
