//! Subcommand implementations

use crate::settings::Settings;
use anyhow::{bail, Context};
use bytes::Bytes;
use priv8_client::{
    Config, MemoryKeyNetwork, MemoryStorageGateway, ObjectRef, StorageOrchestrator,
};
use priv8_crypto::{
    Address, CapacityDelegation, CapacityDelegationIssuer, Condition, ConditionSet, IdentitySigner, LocalWallet,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Wallet from a hex key; offline runs may fall back to a throwaway wallet
pub fn load_wallet(key: Option<&str>, offline: bool) -> anyhow::Result<LocalWallet> {
    match key {
        Some(key) => LocalWallet::from_hex(key).context("PRIV8_WALLET_KEY is not a valid secp256k1 key"),
        None if offline => {
            warn!("No wallet key given, using a throwaway wallet");
            Ok(LocalWallet::random())
        }
        None => bail!("a wallet key is required (set PRIV8_WALLET_KEY or pass --wallet-key)"),
    }
}

/// Orchestrator against the configured services, or fully in memory
pub fn build_orchestrator(
    settings: &Settings,
    wallet: Arc<LocalWallet>,
    offline: bool,
) -> anyhow::Result<StorageOrchestrator> {
    let config = settings.client_config();
    if !offline {
        return StorageOrchestrator::from_config(config, wallet).context("failed to configure client");
    }

    let network = Arc::new(MemoryKeyNetwork::new(settings.network.clone()));
    network.set_balance(&settings.chain, wallet.address(), settings.offline_balance_wei.clone());
    let config = Config {
        state_file: None,
        ..config
    };
    Ok(StorageOrchestrator::new(
        config,
        Arc::new(MemoryStorageGateway::new()),
        network,
        wallet,
    ))
}

/// "native balance on `chain` is at least `min_wei`"
pub fn balance_conditions(chain: &str, min_wei: &str) -> anyhow::Result<ConditionSet> {
    let conditions = ConditionSet::single(Condition::native_balance_at_least(chain, min_wei));
    conditions.validate().context("invalid condition")?;
    Ok(conditions)
}

/// Read a delegation previously written by `priv8 delegate`
pub fn read_delegation(path: &Path) -> anyhow::Result<CapacityDelegation> {
    let body = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let delegation: CapacityDelegation =
        serde_json::from_slice(&body).with_context(|| format!("{} is not a capacity delegation", path.display()))?;
    delegation.verify().context("capacity delegation signature is invalid")?;
    Ok(delegation)
}

/// Encrypt and upload; with `verify`, download and decrypt it again
pub async fn upload(
    client: &StorageOrchestrator,
    bucket: &str,
    name: Option<String>,
    plaintext: &[u8],
    conditions: &ConditionSet,
    verify: bool,
) -> anyhow::Result<ObjectRef> {
    let name = name.unwrap_or_else(|| client.generate_object_name());
    let object = client
        .upload_encrypted(bucket, &name, plaintext, conditions)
        .await
        .with_context(|| format!("failed to upload {}/{}", bucket, name))?;

    if verify {
        let roundtrip = client
            .download_and_decrypt(&object.bucket, &object.name)
            .await
            .context("uploaded object could not be decrypted")?;
        if roundtrip.as_ref() != plaintext {
            bail!("decrypted object does not match the uploaded data");
        }
        info!(object = %object, "verified round trip");
    }
    Ok(object)
}

/// Download and decrypt `target`, or the last upload when none is given
pub async fn download(client: &StorageOrchestrator, target: Option<ObjectRef>) -> anyhow::Result<(ObjectRef, Bytes)> {
    match target {
        Some(object) => {
            let plaintext = client
                .download_and_decrypt(&object.bucket, &object.name)
                .await
                .with_context(|| format!("failed to download {}", object))?;
            Ok((object, plaintext))
        }
        None => client
            .download_last_upload()
            .await?
            .context("no file has been uploaded yet; pass --bucket and --name"),
    }
}

/// Issue a capacity delegation signed by `owner`
pub async fn delegate(
    owner: &LocalWallet,
    capacity_token: &str,
    delegatees: Vec<Address>,
    uses: u64,
    ttl_secs: i64,
) -> anyhow::Result<CapacityDelegation> {
    let delegation = CapacityDelegationIssuer::new(capacity_token)
        .issue(owner, delegatees, uses, chrono::Duration::seconds(ttl_secs))
        .await
        .context("failed to issue capacity delegation")?;
    Ok(delegation)
}
