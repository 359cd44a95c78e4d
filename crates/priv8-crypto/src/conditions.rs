//! Access control conditions
//!
//! A [`ConditionSet`] is an ordered list of predicates over on-chain state.
//! The key network hashes its serialized form and binds the hash to the
//! ciphertext, so the exact same value (same conditions, same order, same
//! field contents) must be presented again when decrypting.

use crate::{CryptoError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Parameter placeholder the network substitutes with the caller's address
pub const USER_ADDRESS_PARAM: &str = ":userAddress";

/// Largest value a threshold may take (2^256 - 1)
const UINT256_MAX: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Comparison operator applied between the on-chain value and the threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `==`
    Equal,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `!=`
    NotEqual,
}

impl Comparator {
    /// All recognized comparators
    pub const ALL: [Comparator; 6] = [
        Self::GreaterOrEqual,
        Self::LessOrEqual,
        Self::Equal,
        Self::Greater,
        Self::Less,
        Self::NotEqual,
    ];

    /// The wire symbol for this comparator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::Greater => ">",
            Self::Less => "<",
            Self::NotEqual => "!=",
        }
    }

    /// Evaluate `lhs <op> rhs` where both sides are unsigned decimal integers
    pub fn evaluate(&self, lhs: &str, rhs: &str) -> Result<bool> {
        let ordering = compare_decimal(&parse_uint256(lhs)?, &parse_uint256(rhs)?);
        Ok(match self {
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Equal => ordering == Ordering::Equal,
            Self::Greater => ordering == Ordering::Greater,
            Self::Less => ordering == Ordering::Less,
            Self::NotEqual => ordering != Ordering::Equal,
        })
    }
}

impl FromStr for Comparator {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CryptoError::MalformedCondition(format!("unrecognized comparator '{}'", s)))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The test applied to the value returned by the condition's method
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnValueTest {
    /// Comparator symbol, kept verbatim so it round-trips byte-identically
    pub comparator: String,
    /// Threshold as an unsigned decimal integer
    pub value: String,
}

/// A single on-chain predicate
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Contract to query; empty for native chain methods
    pub contract_address: String,
    /// Contract standard (e.g. `ERC20`); empty for native chain methods
    pub standard_contract_type: String,
    /// Chain identifier (e.g. `ethereum`)
    pub chain: String,
    /// Method to call (e.g. `eth_getBalance`)
    pub method: String,
    /// Ordered method parameters
    pub parameters: Vec<String>,
    /// Test applied to the method's return value
    pub return_value_test: ReturnValueTest,
}

impl Condition {
    /// "native balance of the caller on `chain` is at least `wei`"
    pub fn native_balance_at_least(chain: impl Into<String>, wei: impl Into<String>) -> Self {
        Self {
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: chain.into(),
            method: "eth_getBalance".to_string(),
            parameters: vec![USER_ADDRESS_PARAM.to_string(), "latest".to_string()],
            return_value_test: ReturnValueTest {
                comparator: Comparator::GreaterOrEqual.as_str().to_string(),
                value: wei.into(),
            },
        }
    }

    /// The comparator, if recognized
    pub fn comparator(&self) -> Result<Comparator> {
        self.return_value_test.comparator.parse()
    }

    /// The threshold value
    pub fn threshold(&self) -> &str {
        &self.return_value_test.value
    }

    /// Check this condition in isolation
    pub fn validate(&self) -> Result<()> {
        if self.chain.trim().is_empty() {
            return Err(CryptoError::MalformedCondition("chain is empty".to_string()));
        }
        if self.method.trim().is_empty() {
            return Err(CryptoError::MalformedCondition("method is empty".to_string()));
        }
        self.comparator()?;
        parse_uint256(self.threshold())?;
        Ok(())
    }

    /// Evaluate against a value already fetched from chain
    pub fn is_satisfied_by(&self, on_chain_value: &str) -> Result<bool> {
        self.comparator()?.evaluate(on_chain_value, self.threshold())
    }
}

/// Ordered, immutable sequence of conditions
///
/// Equality is structural and order-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Create from an ordered list of conditions
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }

    /// Single-condition set
    pub fn single(condition: Condition) -> Self {
        Self(vec![condition])
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every condition and the set as a whole
    ///
    /// An empty set is rejected, and all conditions must name the same chain.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(CryptoError::MalformedCondition("condition set is empty".to_string()));
        }
        for (i, condition) in self.0.iter().enumerate() {
            condition.validate().map_err(|e| match e {
                CryptoError::MalformedCondition(msg) => {
                    CryptoError::MalformedCondition(format!("condition {}: {}", i, msg))
                }
                other => other,
            })?;
        }
        self.chain()?;
        Ok(())
    }

    /// The chain shared by every condition
    pub fn chain(&self) -> Result<&str> {
        let first = self
            .0
            .first()
            .ok_or_else(|| CryptoError::MalformedCondition("condition set is empty".to_string()))?;
        if let Some(other) = self.0.iter().find(|c| c.chain != first.chain) {
            return Err(CryptoError::MalformedCondition(format!(
                "conditions span multiple chains: '{}' and '{}'",
                first.chain, other.chain
            )));
        }
        Ok(&first.chain)
    }

    /// Canonical serialized form
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// SHA-256 of the canonical form, hex encoded
    pub fn hash(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.canonical_bytes()?)))
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        Self::new(conditions)
    }
}

/// Parse an unsigned 256-bit decimal integer, returning it without leading zeros
pub fn parse_uint256(s: &str) -> Result<String> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::MalformedCondition(format!(
            "'{}' is not an unsigned decimal integer",
            s
        )));
    }
    let trimmed = s.trim_start_matches('0');
    let normalized = if trimmed.is_empty() { "0" } else { trimmed };
    if compare_decimal(normalized, UINT256_MAX) == Ordering::Greater {
        return Err(CryptoError::MalformedCondition(format!("'{}' exceeds uint256", s)));
    }
    Ok(normalized.to_string())
}

// Both inputs must be normalized (no leading zeros).
fn compare_decimal(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
