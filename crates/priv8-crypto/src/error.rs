//! Error types for the priv8-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors raised by local, network-free operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A condition failed local validation
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    /// No wallet or key context is reachable for signing
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// Delegation time-to-live must be strictly positive
    #[error("invalid ttl: {0} seconds")]
    InvalidTtl(i64),

    /// Delegation use ceiling must be strictly positive
    #[error("invalid max uses: {0}")]
    InvalidMaxUses(u64),

    /// A delegation must name at least one delegatee
    #[error("delegatee set is empty")]
    EmptyDelegateeSet,

    /// A mandatory sign-in statement field was not supplied
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature could not be parsed or recovered
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Hex decode error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
