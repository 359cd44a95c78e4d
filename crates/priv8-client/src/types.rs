//! Common types for the client SDK

use crate::{ClientError, Result};
use priv8_crypto::{ConditionSet, LitResource, ResourceAbilityRequest};
use serde::{Deserialize, Serialize};

/// Ciphertext, integrity hash and gating conditions, persisted as one unit
///
/// The conditions travel with the ciphertext and are presented unchanged at
/// decryption time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Network-returned ciphertext (base64)
    pub ciphertext: String,
    /// Network-returned digest of the plaintext (hex)
    pub data_to_encrypt_hash: String,
    /// Conditions the ciphertext is bound to
    pub access_control_conditions: ConditionSet,
}

impl EncryptedPayload {
    /// Serialize as the stored object body
    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Parse a stored object body
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let payload: Self =
            serde_json::from_slice(bytes).map_err(|e| ClientError::CorruptPayload(e.to_string()))?;
        if payload.ciphertext.is_empty() {
            return Err(ClientError::CorruptPayload("ciphertext is empty".to_string()));
        }
        if payload.data_to_encrypt_hash.is_empty() {
            return Err(ClientError::CorruptPayload("dataToEncryptHash is empty".to_string()));
        }
        if payload.access_control_conditions.is_empty() {
            return Err(ClientError::CorruptPayload("accessControlConditions is empty".to_string()));
        }
        Ok(payload)
    }

    /// Chain the gating conditions are evaluated on
    pub fn chain(&self) -> Result<&str> {
        Ok(self.access_control_conditions.chain()?)
    }

    /// Resource a session must cover to decrypt this payload
    pub fn decryption_resource(&self) -> Result<LitResource> {
        Ok(LitResource::access_control_condition(
            &self.access_control_conditions.hash()?,
            &self.data_to_encrypt_hash,
        ))
    }

    /// The (resource, ability) pair needed to decrypt this payload
    pub fn decryption_request(&self) -> Result<ResourceAbilityRequest> {
        Ok(ResourceAbilityRequest::decryption(self.decryption_resource()?))
    }
}

/// Location of an uploaded object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

/// A bucket as listed by the storage gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A file as listed by the storage gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "RootCID", skip_serializing_if = "Option::is_none")]
    pub root_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// `{ "data": ... }` envelope used by the storage gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub data: T,
}
