//! # priv8 Client SDK
//!
//! Store data in a bucket-oriented object store, encrypted before it leaves
//! the client and decryptable only by callers that satisfy an on-chain
//! condition.
//!
//! ## Features
//!
//! - **Condition-gated encryption**: ciphertext is bound to a [`ConditionSet`]
//!   evaluated by a threshold key network
//! - **Wallet sessions**: a signed, nonce-bound sign-in statement is exchanged
//!   for short-lived session signatures
//! - **Capacity delegation**: sessions can be funded by an owner's
//!   rate-limited capacity
//! - **Testable**: in-memory key network and storage gateway implementations
//!
//! ## Example
//!
//! ```rust,ignore
//! use priv8_client::{Config, StorageOrchestrator};
//! use priv8_crypto::{Condition, ConditionSet, LocalWallet};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let wallet = Arc::new(LocalWallet::from_hex(&std::env::var("PRIV8_WALLET_KEY")?)?);
//!     let client = StorageOrchestrator::from_config(Config::default(), wallet)?;
//!
//!     let conditions = ConditionSet::single(Condition::native_balance_at_least(
//!         "ethereum",
//!         "1000000000000000",
//!     ));
//!     let object = client
//!         .upload_encrypted("test123", "hello.json", br#"{"msg":"hello"}"#, &conditions)
//!         .await?;
//!
//!     let data = client.download_and_decrypt(&object.bucket, &object.name).await?;
//!     println!("Content: {}", String::from_utf8_lossy(&data));
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod gateway;
pub mod network;
mod orchestrator;
mod session;
mod state;
pub mod storage;
mod types;

pub use config::Config;
pub use error::{ClientError, Result};
pub use gateway::EncryptionGateway;
pub use network::{HttpKeyNetwork, KeyNetwork, MemoryKeyNetwork};
pub use orchestrator::StorageOrchestrator;
pub use session::{AuthAttempt, AuthState, SessionAuthenticator, SessionCredential, SessionRequest};
pub use state::{ClientState, LastUpload};
pub use storage::{HttpStorageGateway, MemoryStorageGateway, StorageGateway};
pub use types::*;

// Re-export the types callers need to describe conditions and identities
pub use priv8_crypto::{
    Address, CapacityDelegation, CapacityDelegationIssuer, Condition, ConditionSet, IdentitySigner,
    LocalWallet,
};
