//! Condition-gated encryption through the key network

use crate::{
    network::{DecryptRequest, EncryptRequest, KeyNetwork, NetworkInfo},
    session::SessionCredential,
    types::EncryptedPayload,
    ClientError, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use priv8_crypto::ConditionSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Encrypts under conditions and decrypts with a session credential
#[derive(Clone)]
pub struct EncryptionGateway {
    network: Arc<dyn KeyNetwork>,
    connected: Arc<OnceCell<NetworkInfo>>,
}

impl std::fmt::Debug for EncryptionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionGateway").finish_non_exhaustive()
    }
}

impl EncryptionGateway {
    pub fn new(network: Arc<dyn KeyNetwork>) -> Self {
        Self {
            network,
            connected: Arc::new(OnceCell::new()),
        }
    }

    /// Handshake with the network
    ///
    /// Only the first successful handshake goes to the network; a failed one
    /// is retried on the next call.
    pub async fn connect(&self) -> Result<&NetworkInfo> {
        self.connected
            .get_or_try_init(|| async {
                let info = self.network.connect().await?;
                debug!(network = %info.network, nodes = info.node_count, threshold = info.threshold, "connected");
                Ok::<_, ClientError>(info)
            })
            .await
    }

    /// Encrypt `plaintext` so that only callers satisfying `conditions` can
    /// decrypt it
    ///
    /// No session is needed. Two calls with the same input produce different
    /// ciphertexts.
    #[instrument(skip(self, plaintext, conditions), fields(size = plaintext.len()))]
    pub async fn encrypt(&self, plaintext: &[u8], conditions: &ConditionSet) -> Result<EncryptedPayload> {
        conditions.validate()?;

        let response = self
            .network
            .encrypt(EncryptRequest {
                access_control_conditions: conditions.clone(),
                data_to_encrypt: STANDARD.encode(plaintext),
            })
            .await?;
        if response.ciphertext.is_empty() || response.data_to_encrypt_hash.is_empty() {
            return Err(ClientError::InvalidResponse(
                "network returned an empty ciphertext or hash".to_string(),
            ));
        }

        Ok(EncryptedPayload {
            ciphertext: response.ciphertext,
            data_to_encrypt_hash: response.data_to_encrypt_hash,
            access_control_conditions: conditions.clone(),
        })
    }

    /// Decrypt `payload` with `session`
    ///
    /// Expired sessions, sessions lacking the decryption ability for this
    /// payload and sessions for another chain fail here without contacting
    /// the network.
    #[instrument(skip(self, payload, session), fields(identity = %session.identity))]
    pub async fn decrypt(&self, payload: &EncryptedPayload, session: &SessionCredential) -> Result<Bytes> {
        if session.is_expired_at(Utc::now()) {
            return Err(ClientError::SessionExpired(session.expires_at));
        }
        let needed = payload.decryption_request()?;
        if !session.grants(&needed) {
            return Err(ClientError::InsufficientAbility(format!(
                "session does not grant {} on {}",
                needed.ability.as_str(),
                needed.resource
            )));
        }
        let chain = payload.chain()?;
        if session.chain != chain {
            return Err(ClientError::InsufficientAbility(format!(
                "session was granted on {}, conditions are evaluated on {}",
                session.chain, chain
            )));
        }

        let response = self
            .network
            .decrypt(DecryptRequest {
                access_control_conditions: payload.access_control_conditions.clone(),
                chain: chain.to_string(),
                ciphertext: payload.ciphertext.clone(),
                data_to_encrypt_hash: payload.data_to_encrypt_hash.clone(),
                session_sigs: session.signatures.clone(),
            })
            .await?;
        let plaintext = STANDARD
            .decode(&response.decrypted_data)
            .map_err(|e| ClientError::InvalidResponse(format!("decrypted data is not base64: {}", e)))?;
        Ok(Bytes::from(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryKeyNetwork;
    use crate::session::{SessionAuthenticator, SessionRequest};
    use priv8_crypto::{Condition, IdentitySigner, LocalWallet};

    const MIN_WEI: &str = "1000000000000000";

    struct Fixture {
        network: Arc<MemoryKeyNetwork>,
        wallet: Arc<LocalWallet>,
        gateway: EncryptionGateway,
        authenticator: SessionAuthenticator,
    }

    fn fixture() -> Fixture {
        let network = Arc::new(MemoryKeyNetwork::default());
        let wallet = Arc::new(LocalWallet::random());
        Fixture {
            gateway: EncryptionGateway::new(network.clone()),
            authenticator: SessionAuthenticator::new(network.clone(), wallet.clone()),
            network,
            wallet,
        }
    }

    fn conditions() -> ConditionSet {
        ConditionSet::single(Condition::native_balance_at_least("ethereum", MIN_WEI))
    }

    async fn session_for(f: &Fixture, payload: &EncryptedPayload) -> SessionCredential {
        f.authenticator
            .get_session_sigs(
                SessionRequest::new("ethereum")
                    .with_uri("lit:session:test")
                    .with_expiration(Utc::now() + chrono::Duration::minutes(5))
                    .with_resource_ability_requests(vec![payload.decryption_request().unwrap()]),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_handshakes_once() {
        let f = fixture();
        f.network.set_unreachable(true);
        assert!(matches!(f.gateway.connect().await, Err(ClientError::NetworkUnreachable(_))));

        f.network.set_unreachable(false);
        let info = f.gateway.connect().await.unwrap();
        assert_eq!(info.network, "datil-dev");
        assert_eq!(info.node_count, 3);
        assert_eq!(info.threshold, 2);

        // a clone shares the handshake
        f.gateway.clone().connect().await.unwrap();
        assert_eq!(f.network.connect_requests(), 1);
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), MIN_WEI);

        let payload = f.gateway.encrypt(br#"{"msg":"hello"}"#, &conditions()).await.unwrap();
        let session = session_for(&f, &payload).await;
        let plaintext = f.gateway.decrypt(&payload, &session).await.unwrap();
        assert_eq!(&plaintext[..], br#"{"msg":"hello"}"#);

        // Repeated decryption with the same session is safe
        assert_eq!(f.gateway.decrypt(&payload, &session).await.unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_encrypt_twice_differs_but_both_decrypt() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), "2000000000000000");

        let a = f.gateway.encrypt(b"same", &conditions()).await.unwrap();
        let b = f.gateway.encrypt(b"same", &conditions()).await.unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);

        let session_a = session_for(&f, &a).await;
        let session_b = session_for(&f, &b).await;
        assert_eq!(&f.gateway.decrypt(&a, &session_a).await.unwrap()[..], b"same");
        assert_eq!(&f.gateway.decrypt(&b, &session_b).await.unwrap()[..], b"same");
    }

    #[tokio::test]
    async fn test_conditions_not_met() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), "999999999999999");

        let payload = f.gateway.encrypt(b"secret", &conditions()).await.unwrap();
        let session = session_for(&f, &payload).await;
        assert!(matches!(
            f.gateway.decrypt(&payload, &session).await,
            Err(ClientError::ConditionsNotMet(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejected_locally() {
        let f = fixture();
        let payload = f.gateway.encrypt(b"secret", &conditions()).await.unwrap();
        let mut session = session_for(&f, &payload).await;
        session.expires_at = Utc::now() - chrono::Duration::seconds(1);

        assert!(matches!(
            f.gateway.decrypt(&payload, &session).await,
            Err(ClientError::SessionExpired(_))
        ));
        assert_eq!(f.network.decrypt_requests(), 0);
    }

    #[tokio::test]
    async fn test_session_for_other_payload_is_insufficient() {
        let f = fixture();
        let payload = f.gateway.encrypt(b"one", &conditions()).await.unwrap();
        let other = f.gateway.encrypt(b"two", &conditions()).await.unwrap();
        let session = session_for(&f, &other).await;

        assert!(matches!(
            f.gateway.decrypt(&payload, &session).await,
            Err(ClientError::InsufficientAbility(_))
        ));
        assert_eq!(f.network.decrypt_requests(), 0);
    }

    #[tokio::test]
    async fn test_malformed_conditions_rejected_before_network() {
        let f = fixture();
        let mut condition = Condition::native_balance_at_least("ethereum", MIN_WEI);
        condition.return_value_test.comparator = "=>".to_string();

        let err = f
            .gateway
            .encrypt(b"x", &ConditionSet::single(condition))
            .await
            .unwrap_err();
        assert!(err.is_malformed_condition());
        assert_eq!(f.network.encrypt_requests(), 0);
    }

    #[tokio::test]
    async fn test_tampered_conditions_fail() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), MIN_WEI);
        let mut payload = f.gateway.encrypt(b"secret", &conditions()).await.unwrap();
        payload.access_control_conditions =
            ConditionSet::single(Condition::native_balance_at_least("ethereum", "1"));

        // A session for the altered conditions passes local checks, but the
        // ciphertext is bound to the original conditions.
        let session = session_for(&f, &payload).await;
        assert!(f.gateway.decrypt(&payload, &session).await.is_err());
    }
}
