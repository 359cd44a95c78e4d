//! Sign-in statements (EIP-4361 with a ReCap resource)
//!
//! A [`SignInStatement`] is built fresh for every authentication attempt,
//! signed once, and discarded. The builder refuses to produce a statement
//! until the target URI, the expiration and the resource/ability list are all
//! present, so a statement that would be rejected can never reach a signer.

use crate::{
    identity::Address,
    resources::ResourceAbilityRequest,
    CryptoError, Result,
};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::BTreeMap;

/// Prefix of a ReCap resource URI
pub const RECAP_PREFIX: &str = "urn:recap:";

const DEFAULT_DOMAIN: &str = "localhost";
const DEFAULT_STATEMENT: &str = "priv8: authorize a short-lived session key.";

/// Numeric chain id for a chain name, when known
pub fn chain_id(chain: &str) -> Option<u64> {
    match chain {
        "ethereum" => Some(1),
        "optimism" => Some(10),
        "polygon" => Some(137),
        "base" => Some(8453),
        "arbitrum" => Some(42161),
        "yellowstone" => Some(175188),
        "sepolia" => Some(11155111),
        _ => None,
    }
}

/// Encode a resource/ability list as a ReCap URI
pub fn recap_uri(requests: &[ResourceAbilityRequest]) -> Result<String> {
    let mut attenuations: BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>> = BTreeMap::new();
    for request in requests {
        let (namespace, action) = request.ability.recap_action();
        attenuations
            .entry(request.resource.uri())
            .or_default()
            .insert(format!("{}/{}", namespace, action), vec![json!({})]);
    }
    let body = serde_json::to_vec(&json!({ "att": attenuations, "prf": [] }))?;
    Ok(format!(
        "{}{}",
        RECAP_PREFIX,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body)
    ))
}

/// Read a `Name: value` line from a rendered statement
pub fn message_field<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    message.lines().find_map(|line| {
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(": "))
    })
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A nonce-bound, expiring statement an identity signs to authenticate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignInStatement {
    pub domain: String,
    pub address: Address,
    pub statement: String,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
}

impl SignInStatement {
    /// Start a statement for `address` bound to the network `nonce`
    pub fn builder(address: Address, nonce: impl Into<String>) -> SignInStatementBuilder {
        SignInStatementBuilder {
            domain: DEFAULT_DOMAIN.to_string(),
            address,
            nonce: nonce.into(),
            chain_id: 1,
            statement: DEFAULT_STATEMENT.to_string(),
            issued_at: None,
            uri: None,
            expiration: None,
            resource_ability_requests: None,
        }
    }

    /// Whether the statement has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    /// Render the exact text that gets signed
    pub fn to_message(&self) -> Result<String> {
        let recap = recap_uri(&self.resource_ability_requests)?;
        let mut statement = self.statement.clone();
        statement.push_str(" I further authorize the stated URI to perform the following actions on my behalf:");
        for (i, request) in self.resource_ability_requests.iter().enumerate() {
            let (namespace, action) = request.ability.recap_action();
            statement.push_str(&format!(
                " ({}) '{}': '{}' for '{}'.",
                i + 1,
                namespace,
                action,
                request.resource.uri()
            ));
        }

        Ok(format!(
            "{domain} wants you to sign in with your Ethereum account:\n\
             {address}\n\
             \n\
             {statement}\n\
             \n\
             URI: {uri}\n\
             Version: 1\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}\n\
             Expiration Time: {expiration}\n\
             Resources:\n\
             - {recap}",
            domain = self.domain,
            address = self.address,
            statement = statement,
            uri = self.uri,
            chain_id = self.chain_id,
            nonce = self.nonce,
            issued_at = timestamp(&self.issued_at),
            expiration = timestamp(&self.expiration_time),
            recap = recap,
        ))
    }
}

/// Builder for [`SignInStatement`]
#[derive(Clone, Debug)]
pub struct SignInStatementBuilder {
    domain: String,
    address: Address,
    nonce: String,
    chain_id: u64,
    statement: String,
    issued_at: Option<DateTime<Utc>>,
    uri: Option<String>,
    expiration: Option<DateTime<Utc>>,
    resource_ability_requests: Option<Vec<ResourceAbilityRequest>>,
}

impl SignInStatementBuilder {
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = statement.into();
        self
    }

    /// Override the issue time (defaults to now)
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn resource_ability_requests(mut self, requests: Vec<ResourceAbilityRequest>) -> Self {
        self.resource_ability_requests = Some(requests);
        self
    }

    /// Finish the statement
    ///
    /// Fails with [`CryptoError::MissingRequiredField`] if the URI, the
    /// expiration or the resource/ability list is absent or empty.
    pub fn build(self) -> Result<SignInStatement> {
        let uri = self
            .uri
            .filter(|u| !u.trim().is_empty())
            .ok_or(CryptoError::MissingRequiredField("uri"))?;
        let expiration_time = self
            .expiration
            .ok_or(CryptoError::MissingRequiredField("expiration"))?;
        let resource_ability_requests = self
            .resource_ability_requests
            .filter(|r| !r.is_empty())
            .ok_or(CryptoError::MissingRequiredField("resourceAbilityRequests"))?;

        Ok(SignInStatement {
            domain: self.domain,
            address: self.address,
            statement: self.statement,
            uri,
            chain_id: self.chain_id,
            nonce: self.nonce,
            issued_at: self.issued_at.unwrap_or_else(Utc::now),
            expiration_time,
            resource_ability_requests,
        })
    }
}
