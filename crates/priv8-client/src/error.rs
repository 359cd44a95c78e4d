//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
///
/// Local precondition failures are raised before any network call.
/// Network-reported failures are surfaced as-is and never retried here.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Local cryptographic or validation failure
    #[error(transparent)]
    Crypto(#[from] priv8_crypto::CryptoError),

    /// The key network or storage gateway could not be reached
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A node rejected the sign-in signature or the capacity delegation
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// The session credential expired before use
    #[error("session expired at {0}")]
    SessionExpired(chrono::DateTime<chrono::Utc>),

    /// The session does not grant the ability being exercised
    #[error("insufficient ability: {0}")]
    InsufficientAbility(String),

    /// The caller's on-chain state does not satisfy the conditions
    #[error("access conditions not met: {0}")]
    ConditionsNotMet(String),

    /// The downloaded object is not a well-formed encrypted payload
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// Object not found
    #[error("object not found: {bucket}/{name}")]
    ObjectNotFound { bucket: String, name: String },

    /// Upload failed
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Bucket creation raced with another creator
    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// Any other non-success storage gateway response
    #[error("storage error ({status}): {message}")]
    Storage { status: u16, message: String },

    /// A request the client refuses to send, or a step driven out of order
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid response body
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Map a transport-level failure; connect and timeout errors become
    /// [`ClientError::NetworkUnreachable`]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::NetworkUnreachable(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Whether a caller may reasonably retry with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_))
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
            || matches!(self, Self::Storage { status, .. } if *status == 404)
    }

    /// Check if this wraps a malformed condition
    pub fn is_malformed_condition(&self) -> bool {
        matches!(self, Self::Crypto(priv8_crypto::CryptoError::MalformedCondition(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use priv8_crypto::CryptoError;

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::NetworkUnreachable("down".into()).is_retryable());
        assert!(!ClientError::ConditionsNotMet("balance".into()).is_retryable());
        assert!(!ClientError::AuthenticationRejected("sig".into()).is_retryable());
    }

    #[test]
    fn test_crypto_passthrough() {
        let err: ClientError = CryptoError::MalformedCondition("bad".into()).into();
        assert!(err.is_malformed_condition());
        assert_eq!(err.to_string(), "malformed condition: bad");
    }

    #[test]
    fn test_not_found() {
        let err = ClientError::ObjectNotFound {
            bucket: "b".into(),
            name: "n".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "object not found: b/n");
    }
}
