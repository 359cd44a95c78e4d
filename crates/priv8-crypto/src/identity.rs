//! Wallet identities and signing
//!
//! Identities are Ethereum-style addresses: the last 20 bytes of the
//! Keccak-256 hash of an uncompressed secp256k1 public key. Messages are
//! signed with the EIP-191 `personal_sign` prefix and produce 65-byte
//! recoverable signatures (`r || s || v`).
//!
//! Only an [`IdentitySigner`] ever touches private key material; everything
//! else in the system holds an [`Address`].

use crate::{CryptoError, Result};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of an address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Size of a recoverable signature in bytes
pub const SIGNATURE_SIZE: usize = 65;

/// How auth signatures produced by this module are derived
pub const DERIVED_VIA_PERSONAL_SIGN: &str = "web3.eth.personal.sign";

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-191 `personal_sign` digest of a message
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// An identity: an address derived from a public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "address must be {} bytes, got {}",
                ADDRESS_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Derive the address of a public key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&hash[12..]);
        Self(arr)
    }

    /// Get the address bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// EIP-55 mixed-case checksum encoding
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        Self::from_bytes(&hex::decode(stripped)?)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A recoverable secp256k1 signature over an EIP-191 message
#[derive(Clone, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw `r || s || v` bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SIGNATURE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
    }

    /// Recover the address that signed `message`
    pub fn recover(&self, message: &[u8]) -> Result<Address> {
        let signature = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let v = self.0[64];
        let recovery_id = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
            .ok_or_else(|| CryptoError::InvalidSignature(format!("bad recovery byte {}", v)))?;
        let key = VerifyingKey::recover_from_prehash(&eip191_hash(message), &signature, recovery_id)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Ok(Address::from_verifying_key(&key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Produces signatures on behalf of one identity
///
/// Signing is stateless per call and implementations must tolerate
/// concurrent requests.
#[async_trait]
pub trait IdentitySigner: Send + Sync {
    /// The identity this signer speaks for
    fn address(&self) -> Address;

    /// Sign an arbitrary message
    ///
    /// Fails with [`CryptoError::SignerUnavailable`] when no key or wallet
    /// surface is reachable.
    async fn sign(&self, message: &[u8]) -> Result<Signature>;
}

/// A wallet whose secp256k1 key lives in process memory
pub struct LocalWallet {
    key: SigningKey,
    address: Address,
}

impl LocalWallet {
    /// Generate a fresh random wallet
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Create from a 32-byte secret scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Create from a hex secret, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s.trim().strip_prefix("0x").unwrap_or(s.trim()))?)
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = Address::from_verifying_key(key.verifying_key());
        Self { key, address }
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet").field("address", &self.address).finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentitySigner for LocalWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, message: &[u8]) -> Result<Signature> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&eip191_hash(message))
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;
        Ok(Signature(bytes))
    }
}

/// A known identity with no reachable signing surface
///
/// Useful for read-only flows where only the address is needed; every
/// signing request fails with [`CryptoError::SignerUnavailable`].
#[derive(Clone, Debug)]
pub struct DetachedSigner {
    address: Address,
}

impl DetachedSigner {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl IdentitySigner for DetachedSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, _message: &[u8]) -> Result<Signature> {
        Err(CryptoError::SignerUnavailable(format!(
            "no signing surface for {}",
            self.address
        )))
    }
}

/// Signed message envelope understood by the key network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    /// Hex signature
    pub sig: String,
    /// Signing scheme identifier
    pub derived_via: String,
    /// The exact message that was signed
    pub signed_message: String,
    /// Claimed signer
    pub address: Address,
}

impl AuthSig {
    /// Sign `message` with `signer` and wrap the result
    pub async fn sign(signer: &dyn IdentitySigner, message: String) -> Result<Self> {
        let signature = signer.sign(message.as_bytes()).await?;
        Ok(Self {
            sig: signature.to_hex(),
            derived_via: DERIVED_VIA_PERSONAL_SIGN.to_string(),
            signed_message: message,
            address: signer.address(),
        })
    }

    /// Check that the signature recovers to the claimed address
    pub fn verify(&self) -> Result<()> {
        let recovered = Signature::from_hex(&self.sig)?.recover(self.signed_message.as_bytes())?;
        if recovered != self.address {
            return Err(CryptoError::InvalidSignature(format!(
                "signed by {}, claimed {}",
                recovered, self.address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test vector: secret key 1
    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_address_derivation_vector() {
        let wallet = LocalWallet::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            wallet.address().to_checksum(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_address_parse_roundtrip() {
        let wallet = LocalWallet::random();
        let text = wallet.address().to_string();
        let parsed: Address = text.parse().unwrap();
        assert_eq!(parsed, wallet.address());
        assert!(Address::from_str("0x1234").is_err());
    }

    #[tokio::test]
    async fn test_sign_and_recover() {
        let wallet = LocalWallet::random();
        let signature = wallet.sign(b"hello").await.unwrap();
        assert_eq!(signature.recover(b"hello").unwrap(), wallet.address());
        assert_ne!(signature.recover(b"other").unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn test_detached_signer_unavailable() {
        let signer = DetachedSigner::new(LocalWallet::random().address());
        let err = signer.sign(b"anything").await.unwrap_err();
        assert!(matches!(err, CryptoError::SignerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_auth_sig_verify() {
        let wallet = LocalWallet::random();
        let mut auth_sig = AuthSig::sign(&wallet, "statement".to_string()).await.unwrap();
        assert!(auth_sig.verify().is_ok());

        auth_sig.address = LocalWallet::random().address();
        assert!(matches!(auth_sig.verify(), Err(CryptoError::InvalidSignature(_))));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let wallet = LocalWallet::from_hex(KEY_ONE).unwrap();
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains(KEY_ONE));
    }
}
