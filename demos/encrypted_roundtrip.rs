//! Condition-gated encrypted storage, end to end
//!
//! This example demonstrates:
//! - Encrypting a JSON document under a minimum-balance condition
//! - Uploading it to a bucket (created on first use)
//! - Delegating capacity from an owner wallet to a reader wallet
//! - Downloading, authenticating and decrypting as the reader
//! - A reader below the balance threshold being refused
//!
//! Everything runs against the in-memory key network and storage gateway.
//!
//! Run with: cargo run --example encrypted_roundtrip

use priv8_client::{
    CapacityDelegationIssuer, ClientError, Condition, ConditionSet, Config, IdentitySigner, LocalWallet,
    MemoryKeyNetwork, MemoryStorageGateway, StorageOrchestrator,
};
use std::sync::Arc;

const MIN_WEI: &str = "1000000000000000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("🔐 priv8 - Encrypted Round Trip Example\n");

    let storage = Arc::new(MemoryStorageGateway::new());
    let network = Arc::new(MemoryKeyNetwork::new("datil-dev"));
    network.set_require_capacity(true);

    let owner = Arc::new(LocalWallet::random());
    let reader = Arc::new(LocalWallet::random());
    let pauper = Arc::new(LocalWallet::random());
    network.set_balance("ethereum", reader.address(), "2000000000000000");
    network.set_balance("ethereum", pauper.address(), "10");

    println!("👤 Owner:  {}", owner.address());
    println!("👤 Reader: {}", reader.address());
    println!("👤 Pauper: {}\n", pauper.address());

    // ==================== Capacity Delegation ====================

    println!("🎟️  Delegating capacity to reader and pauper...");
    let delegation = CapacityDelegationIssuer::new("1337")
        .issue(
            owner.as_ref(),
            [reader.address(), pauper.address()],
            4,
            chrono::Duration::minutes(30),
        )
        .await?;
    println!(
        "   ✅ {} uses until {}",
        delegation.max_uses(),
        delegation.expires_at()
    );

    // ==================== Upload ====================

    let conditions = ConditionSet::single(Condition::native_balance_at_least("ethereum", MIN_WEI));
    let uploader = StorageOrchestrator::new(
        Config::default().with_object_name_prefix("encrypted_test_"),
        storage.clone(),
        network.clone(),
        owner.clone(),
    )
    .with_capacity_delegation(delegation.clone());

    println!("\n📤 Uploading {{\"msg\":\"hello\"}} to 'test123'...");
    let object = uploader
        .upload_encrypted_json("test123", &serde_json::json!({ "msg": "hello" }), &conditions)
        .await?;
    println!("   ✅ Stored as {}", object);

    // ==================== Download ====================

    println!("\n📥 Reader downloading {}...", object);
    let reader_client = StorageOrchestrator::new(
        Config::default(),
        storage.clone(),
        network.clone(),
        reader.clone(),
    )
    .with_capacity_delegation(delegation.clone());
    let plaintext = reader_client.download_and_decrypt(&object.bucket, &object.name).await?;
    println!("   ✅ Decrypted: {}", String::from_utf8_lossy(&plaintext));

    println!("\n📥 Pauper downloading {}...", object);
    let pauper_client = StorageOrchestrator::new(Config::default(), storage, network.clone(), pauper)
        .with_capacity_delegation(delegation.clone());
    match pauper_client.download_and_decrypt(&object.bucket, &object.name).await {
        Err(ClientError::ConditionsNotMet(reason)) => println!("   🚫 Refused: {}", reason),
        Ok(_) => anyhow::bail!("pauper should not be able to decrypt"),
        Err(e) => return Err(e.into()),
    }

    println!(
        "\n🎟️  Delegation uses consumed: {} of {}",
        network.delegation_uses(&delegation),
        delegation.max_uses()
    );

    Ok(())
}
