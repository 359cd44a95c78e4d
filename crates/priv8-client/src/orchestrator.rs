//! Encrypt-then-upload and download-then-decrypt workflows

use crate::{
    gateway::EncryptionGateway,
    network::{HttpKeyNetwork, KeyNetwork},
    session::{SessionAuthenticator, SessionCredential, SessionRequest},
    state::ClientState,
    storage::{HttpStorageGateway, StorageGateway},
    types::{BucketInfo, EncryptedPayload, ObjectRef},
    ClientError, Config, Result,
};
use bytes::Bytes;
use chrono::Utc;
use priv8_crypto::{CapacityDelegation, ConditionSet, IdentitySigner};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Top-level client: bucket storage with condition-gated encryption
pub struct StorageOrchestrator {
    config: Config,
    storage: Arc<dyn StorageGateway>,
    gateway: EncryptionGateway,
    authenticator: SessionAuthenticator,
    capacity_delegation: Option<CapacityDelegation>,
    state: ClientState,
}

impl std::fmt::Debug for StorageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageOrchestrator")
            .field("identity", &self.authenticator.identity())
            .field("storage_endpoint", &self.config.storage_endpoint)
            .field("network", &self.config.network)
            .field("delegated", &self.capacity_delegation.is_some())
            .finish_non_exhaustive()
    }
}

impl StorageOrchestrator {
    /// Assemble from explicit collaborators
    pub fn new(
        config: Config,
        storage: Arc<dyn StorageGateway>,
        network: Arc<dyn KeyNetwork>,
        signer: Arc<dyn IdentitySigner>,
    ) -> Self {
        let state = match &config.state_file {
            Some(path) => ClientState::with_file(path),
            None => ClientState::in_memory(),
        };
        let authenticator =
            SessionAuthenticator::new(network.clone(), signer).with_domain(config.session_domain.clone());
        Self {
            gateway: EncryptionGateway::new(network),
            authenticator,
            storage,
            capacity_delegation: None,
            state,
            config,
        }
    }

    /// Connect to the HTTP storage gateway and key network named in `config`
    pub fn from_config(config: Config, signer: Arc<dyn IdentitySigner>) -> Result<Self> {
        let storage = Arc::new(HttpStorageGateway::new(&config)?);
        let network = Arc::new(HttpKeyNetwork::new(&config)?);
        Ok(Self::new(config, storage, network, signer))
    }

    /// Fund every session with `delegation`
    pub fn with_capacity_delegation(mut self, delegation: CapacityDelegation) -> Self {
        self.capacity_delegation = Some(delegation);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &EncryptionGateway {
        &self.gateway
    }

    pub fn authenticator(&self) -> &SessionAuthenticator {
        &self.authenticator
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Handshake with the key network before its first use
    ///
    /// Fails if the network answering is not the one configured.
    pub async fn ensure_connected(&self) -> Result<()> {
        let info = self.gateway.connect().await?;
        if info.network != self.config.network {
            return Err(ClientError::InvalidResponse(format!(
                "connected to key network {}, expected {}",
                info.network, self.config.network
            )));
        }
        Ok(())
    }

    /// `<prefix><unix-millis>.json`
    pub fn generate_object_name(&self) -> String {
        format!("{}{}.json", self.config.object_name_prefix, Utc::now().timestamp_millis())
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.storage.list_buckets().await
    }

    /// Create `bucket` unless it already exists; returns whether it was created
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool> {
        let buckets = self.storage.list_buckets().await?;
        if buckets.iter().any(|b| b.name == bucket) {
            debug!(bucket, "bucket exists");
            return Ok(false);
        }

        match self.storage.create_bucket(bucket).await {
            Ok(()) => {
                info!(bucket, "created bucket");
                Ok(true)
            }
            // Created concurrently by someone else
            Err(ClientError::BucketAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Encrypt `plaintext` under `conditions` and store it as `bucket/name`
    ///
    /// Not atomic with respect to bucket creation: a failed upload leaves the
    /// bucket in place, and retrying the whole call is safe.
    #[instrument(skip(self, plaintext, conditions), fields(size = plaintext.len()))]
    pub async fn upload_encrypted(
        &self,
        bucket: &str,
        name: &str,
        plaintext: &[u8],
        conditions: &ConditionSet,
    ) -> Result<ObjectRef> {
        // Fail on bad conditions before touching storage
        conditions.validate()?;
        self.ensure_connected().await?;
        self.ensure_bucket(bucket).await?;

        let payload = self.gateway.encrypt(plaintext, conditions).await?;
        let body = payload.to_json_pretty()?;
        self.storage.upload_file(bucket, name, Bytes::from(body)).await?;

        let object = ObjectRef::new(bucket, name);
        // The object is stored; a pointer that failed to persist is not an upload failure
        if let Err(e) = self.state.record_upload(&object).await {
            warn!(object = %object, error = %e, "failed to persist last upload");
        }
        info!(object = %object, "uploaded encrypted object");
        Ok(object)
    }

    /// Serialize `value` as JSON and upload it under a generated name
    pub async fn upload_encrypted_json<T: Serialize + ?Sized>(
        &self,
        bucket: &str,
        value: &T,
        conditions: &ConditionSet,
    ) -> Result<ObjectRef> {
        let plaintext = serde_json::to_vec(value).map_err(priv8_crypto::CryptoError::from)?;
        let name = self.generate_object_name();
        self.upload_encrypted(bucket, &name, &plaintext, conditions).await
    }

    /// Download `bucket/name`, authenticate for it and decrypt
    #[instrument(skip(self))]
    pub async fn download_and_decrypt(&self, bucket: &str, name: &str) -> Result<Bytes> {
        let body = self.storage.download_file(bucket, name).await?;
        let payload = EncryptedPayload::from_slice(&body)?;

        // A fresh session scoped to exactly this payload
        let session = self.authenticate_for(&payload).await?;
        self.gateway.decrypt(&payload, &session).await
    }

    /// Download and decrypt whatever was uploaded last, if anything was
    pub async fn download_last_upload(&self) -> Result<Option<(ObjectRef, Bytes)>> {
        let Some(last) = self.state.last_upload().await? else {
            return Ok(None);
        };
        let object = last.object();
        let plaintext = self.download_and_decrypt(&object.bucket, &object.name).await?;
        Ok(Some((object, plaintext)))
    }

    /// Negotiate a session granting decryption of `payload` only
    pub async fn authenticate_for(&self, payload: &EncryptedPayload) -> Result<SessionCredential> {
        self.ensure_connected().await?;
        let mut request = SessionRequest::new(payload.chain()?)
            .with_uri(self.config.session_uri.clone())
            .with_expiration(Utc::now() + self.config.session_ttl_chrono())
            .with_resource_ability_requests(vec![payload.decryption_request()?]);
        if let Some(delegation) = &self.capacity_delegation {
            request = request.with_capacity_delegation(delegation.clone());
        }
        self.authenticator.get_session_sigs(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryKeyNetwork;
    use crate::storage::MemoryStorageGateway;
    use priv8_crypto::{Condition, LocalWallet};

    const MIN_WEI: &str = "1000000000000000";

    struct Fixture {
        storage: Arc<MemoryStorageGateway>,
        network: Arc<MemoryKeyNetwork>,
        wallet: Arc<LocalWallet>,
        orchestrator: StorageOrchestrator,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorageGateway::new());
        let network = Arc::new(MemoryKeyNetwork::default());
        let wallet = Arc::new(LocalWallet::random());
        let orchestrator = StorageOrchestrator::new(
            Config::default(),
            storage.clone(),
            network.clone(),
            wallet.clone(),
        );
        Fixture {
            storage,
            network,
            wallet,
            orchestrator,
        }
    }

    fn conditions() -> ConditionSet {
        ConditionSet::single(Condition::native_balance_at_least("ethereum", MIN_WEI))
    }

    #[tokio::test]
    async fn test_upload_creates_bucket_once() {
        let f = fixture();
        f.orchestrator.upload_encrypted("test123", "a.json", b"a", &conditions()).await.unwrap();
        f.orchestrator.upload_encrypted("test123", "b.json", b"b", &conditions()).await.unwrap();
        assert!(f.storage.has_bucket("test123"));
        assert_eq!(f.storage.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_existing_bucket_is_not_an_error() {
        let f = fixture();
        f.storage.create_bucket("test123").await.unwrap();
        assert!(!f.orchestrator.ensure_bucket("test123").await.unwrap());
        f.orchestrator.upload_encrypted("test123", "a.json", b"a", &conditions()).await.unwrap();
    }

    #[tokio::test]
    async fn test_roundtrip_through_storage() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), MIN_WEI);

        let object = f
            .orchestrator
            .upload_encrypted_json("test123", &serde_json::json!({"msg": "hello"}), &conditions())
            .await
            .unwrap();
        assert!(object.name.starts_with("encrypted_"));
        assert!(object.name.ends_with(".json"));

        let plaintext = f.orchestrator.download_and_decrypt(&object.bucket, &object.name).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(value, serde_json::json!({"msg": "hello"}));

        let (last, again) = f.orchestrator.download_last_upload().await.unwrap().unwrap();
        assert_eq!(last, object);
        assert_eq!(again, plaintext);
    }

    #[tokio::test]
    async fn test_stored_body_is_the_payload() {
        let f = fixture();
        let object = f.orchestrator.upload_encrypted("b", "x.json", b"x", &conditions()).await.unwrap();
        let body = f.storage.download_file(&object.bucket, &object.name).await.unwrap();
        let payload = EncryptedPayload::from_slice(&body).unwrap();
        assert_eq!(payload.access_control_conditions, conditions());
    }

    #[tokio::test]
    async fn test_upload_failure_surfaces() {
        let f = fixture();
        f.storage.set_reject_uploads(true);
        assert!(matches!(
            f.orchestrator.upload_encrypted("b", "x.json", b"x", &conditions()).await,
            Err(ClientError::UploadFailed(_))
        ));
        assert!(f.orchestrator.state().last_upload().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_objects() {
        let f = fixture();
        assert!(f.orchestrator.download_and_decrypt("b", "missing.json").await.unwrap_err().is_not_found());

        f.storage.insert_raw("b", "bad.json", r#"{"ciphertext":"abc"}"#);
        assert!(matches!(
            f.orchestrator.download_and_decrypt("b", "bad.json").await,
            Err(ClientError::CorruptPayload(_))
        ));
        assert_eq!(f.network.session_requests(), 0);
    }

    #[tokio::test]
    async fn test_handshake_happens_once() {
        let f = fixture();
        f.network.set_balance("ethereum", f.wallet.address(), MIN_WEI);
        assert_eq!(f.network.connect_requests(), 0);

        let object = f.orchestrator.upload_encrypted("b", "x.json", b"x", &conditions()).await.unwrap();
        f.orchestrator.upload_encrypted("b", "y.json", b"y", &conditions()).await.unwrap();
        f.orchestrator.download_and_decrypt(&object.bucket, &object.name).await.unwrap();
        assert_eq!(f.network.connect_requests(), 1);
    }

    #[tokio::test]
    async fn test_wrong_network_refused() {
        let storage = Arc::new(MemoryStorageGateway::new());
        let network = Arc::new(MemoryKeyNetwork::new("habanero"));
        let orchestrator = StorageOrchestrator::new(
            Config::default(),
            storage.clone(),
            network.clone(),
            Arc::new(LocalWallet::random()),
        );
        assert!(matches!(
            orchestrator.upload_encrypted("b", "x.json", b"x", &conditions()).await,
            Err(ClientError::InvalidResponse(_))
        ));
        assert_eq!(network.encrypt_requests(), 0);
        assert!(!storage.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_unwritable_state_file_does_not_fail_upload() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let storage = Arc::new(MemoryStorageGateway::new());
        let orchestrator = StorageOrchestrator::new(
            Config::default().with_state_file(blocker.join("state.json")),
            storage.clone(),
            Arc::new(MemoryKeyNetwork::default()),
            Arc::new(LocalWallet::random()),
        );

        let object = orchestrator.upload_encrypted("b", "x.json", b"x", &conditions()).await.unwrap();
        assert!(storage.download_file(&object.bucket, &object.name).await.is_ok());
        let last = orchestrator.state().last_upload().await.unwrap().unwrap();
        assert_eq!(last.object(), object);
    }

    #[tokio::test]
    async fn test_nothing_uploaded_yet() {
        let f = fixture();
        assert!(f.orchestrator.download_last_upload().await.unwrap().is_none());
    }
}
