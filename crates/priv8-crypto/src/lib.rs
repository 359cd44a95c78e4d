//! # priv8 Crypto
//!
//! Local, network-free building blocks for condition-gated storage.
//!
//! This crate provides:
//! - **Access control conditions**: declarative predicates over on-chain state
//! - **Identities**: secp256k1 wallet addresses and EIP-191 signing
//! - **Sign-in statements**: nonce-bound EIP-4361 messages with ReCap resources
//! - **Capacity delegation**: signed, bounded-use grants of rate-limited capacity
//!
//! ## Security Model
//!
//! - Private keys never leave an [`IdentitySigner`]
//! - Every sign-in statement is built fresh, signed once, and discarded
//! - Threshold decryption happens on the key network, never here
//!
//! ## Example
//!
//! ```rust,ignore
//! use priv8_crypto::{CapacityDelegationIssuer, LocalWallet};
//! use chrono::Duration;
//!
//! let owner = LocalWallet::random();
//! let delegation = CapacityDelegationIssuer::new("capacity-token-id")
//!     .issue(&owner, [delegatee_address], 10, Duration::hours(24))
//!     .await?;
//! ```

pub mod conditions;
pub mod delegation;
pub mod error;
pub mod identity;
pub mod resources;
pub mod siwe;
pub mod symmetric;

pub use conditions::{Comparator, Condition, ConditionSet, ReturnValueTest};
pub use delegation::{CapacityDelegation, CapacityDelegationIssuer, DelegationStatement};
pub use error::{CryptoError, Result};
pub use identity::{Address, AuthSig, DetachedSigner, IdentitySigner, LocalWallet, Signature};
pub use resources::{Ability, LitResource, ResourceAbilityRequest, ResourceKind};
pub use siwe::{SignInStatement, SignInStatementBuilder};
pub use symmetric::SymmetricKey;
