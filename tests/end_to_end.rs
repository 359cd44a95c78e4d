//! End-to-end workflows across the crypto and client crates

use priv8_client::{
    ClientError, Condition, ConditionSet, Config, HttpStorageGateway, IdentitySigner, LocalWallet, MemoryKeyNetwork,
    MemoryStorageGateway, StorageGateway, StorageOrchestrator,
};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAIN: &str = "ethereum";
const MIN_WEI: &str = "1000000000000000";

fn balance_conditions() -> ConditionSet {
    ConditionSet::single(Condition::native_balance_at_least(CHAIN, MIN_WEI))
}

fn memory_client(
    storage: &Arc<MemoryStorageGateway>,
    network: &Arc<MemoryKeyNetwork>,
    wallet: &Arc<LocalWallet>,
    config: Config,
) -> StorageOrchestrator {
    StorageOrchestrator::new(config, storage.clone(), network.clone(), wallet.clone())
}

#[tokio::test]
async fn test_hello_scenario() {
    let storage = Arc::new(MemoryStorageGateway::new());
    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    let wallet = Arc::new(LocalWallet::random());
    network.set_balance(CHAIN, wallet.address(), MIN_WEI);

    let client = memory_client(
        &storage,
        &network,
        &wallet,
        Config::default().with_object_name_prefix("encrypted_test_"),
    );

    // 1. Encrypt and upload to a brand-new bucket
    let object = client
        .upload_encrypted_json("test123", &serde_json::json!({ "msg": "hello" }), &balance_conditions())
        .await
        .unwrap();
    assert_eq!(object.bucket, "test123");
    assert!(object.name.starts_with("encrypted_test_"));
    assert!(storage.has_bucket("test123"));

    // 2. Later, download that exact object and decrypt it
    let plaintext = client.download_and_decrypt("test123", &object.name).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(value, serde_json::json!({ "msg": "hello" }));
}

#[tokio::test]
async fn test_other_reader_below_threshold() {
    let storage = Arc::new(MemoryStorageGateway::new());
    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    let writer = Arc::new(LocalWallet::random());
    let reader = Arc::new(LocalWallet::random());
    network.set_balance(CHAIN, writer.address(), MIN_WEI);
    network.set_balance(CHAIN, reader.address(), "999");

    let object = memory_client(&storage, &network, &writer, Config::default())
        .upload_encrypted("shared", "doc.json", b"{}", &balance_conditions())
        .await
        .unwrap();

    let err = memory_client(&storage, &network, &reader, Config::default())
        .download_and_decrypt(&object.bucket, &object.name)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConditionsNotMet(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_independent_workflows_run_concurrently() {
    let storage = Arc::new(MemoryStorageGateway::new());
    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    let alice = Arc::new(LocalWallet::random());
    let bob = Arc::new(LocalWallet::random());
    network.set_balance(CHAIN, alice.address(), MIN_WEI);
    network.set_balance(CHAIN, bob.address(), MIN_WEI);

    let alice_client = memory_client(&storage, &network, &alice, Config::default());
    let bob_client = memory_client(&storage, &network, &bob, Config::default());

    let (a, b) = tokio::join!(
        async {
            let object = alice_client
                .upload_encrypted("test123", "alice.json", b"alice", &balance_conditions())
                .await
                .unwrap();
            alice_client.download_and_decrypt(&object.bucket, &object.name).await.unwrap()
        },
        async {
            let object = bob_client
                .upload_encrypted("test123", "bob.json", b"bob", &balance_conditions())
                .await
                .unwrap();
            bob_client.download_and_decrypt(&object.bucket, &object.name).await.unwrap()
        }
    );
    assert_eq!(&a[..], b"alice");
    assert_eq!(&b[..], b"bob");
    assert_eq!(storage.list_files("test123").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_last_upload_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let storage = Arc::new(MemoryStorageGateway::new());
    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    let wallet = Arc::new(LocalWallet::random());
    network.set_balance(CHAIN, wallet.address(), MIN_WEI);

    let object = memory_client(&storage, &network, &wallet, Config::default().with_state_file(&state_file))
        .upload_encrypted("test123", "kept.json", b"kept", &balance_conditions())
        .await
        .unwrap();

    let restarted = memory_client(&storage, &network, &wallet, Config::default().with_state_file(&state_file));
    let (last, plaintext) = restarted.download_last_upload().await.unwrap().unwrap();
    assert_eq!(last, object);
    assert_eq!(&plaintext[..], b"kept");
}

// The stored object body is the single JSON part of the multipart upload.
fn uploaded_payload(body: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(body);
    let start = text.find("\r\n\r\n").map(|i| i + 4).unwrap();
    let end = text.rfind('}').map(|i| i + 1).unwrap();
    text[start..end].as_bytes().to_vec()
}

#[tokio::test]
async fn test_http_storage_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/buckets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/buckets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/buckets/test123/files$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    let wallet = Arc::new(LocalWallet::random());
    network.set_balance(CHAIN, wallet.address(), MIN_WEI);
    let config = Config::new(server.uri());
    let client = StorageOrchestrator::new(
        config.clone(),
        Arc::new(HttpStorageGateway::new(&config).unwrap()),
        network.clone(),
        wallet.clone(),
    );

    let object = client
        .upload_encrypted("test123", "hello.json", br#"{"msg":"hello"}"#, &balance_conditions())
        .await
        .unwrap();

    // Serve back exactly what was uploaded
    let upload = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/buckets/test123/files")
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/buckets/test123/files/hello.json/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(uploaded_payload(&upload.body)))
        .mount(&server)
        .await;

    let plaintext = client.download_and_decrypt(&object.bucket, &object.name).await.unwrap();
    assert_eq!(&plaintext[..], br#"{"msg":"hello"}"#);
}
