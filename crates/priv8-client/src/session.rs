//! Session authentication against the key network
//!
//! Every attempt walks the same states:
//!
//! ```text
//! Idle -> ChallengeReceived -> StatementSigned -> SessionGranted
//!   \________________\_______________\__________-> Failed
//! ```
//!
//! An [`AuthAttempt`] owns its nonce and statement; nothing is shared between
//! attempts, so a nonce is never reused. The resulting [`SessionCredential`]
//! is scoped to the abilities requested for one workflow.

use crate::{
    network::{KeyNetwork, SessionSigs, SessionSigsRequest},
    ClientError, Result,
};
use chrono::{DateTime, Utc};
use priv8_crypto::{
    siwe, Address, AuthSig, CapacityDelegation, CryptoError, IdentitySigner, ResourceAbilityRequest,
    SignInStatement,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Short-lived capability granted by the key network
#[derive(Clone, Debug)]
pub struct SessionCredential {
    pub identity: Address,
    pub chain: String,
    pub granted_abilities: BTreeSet<ResourceAbilityRequest>,
    pub expires_at: DateTime<Utc>,
    /// Per-node signatures, presented as-is on decryption
    pub signatures: SessionSigs,
}

impl SessionCredential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the session grants `request`, directly or through a wildcard
    pub fn grants(&self, request: &ResourceAbilityRequest) -> bool {
        request.is_covered_by(&self.granted_abilities)
    }
}

/// What a caller asks for when authenticating
///
/// `uri`, `expiration` and `resource_ability_requests` are mandatory; they
/// are optional here so that their absence is reported as an error instead
/// of being defaulted.
#[derive(Clone, Debug, Default)]
pub struct SessionRequest {
    pub chain: String,
    pub uri: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub resource_ability_requests: Option<Vec<ResourceAbilityRequest>>,
    pub capacity_delegation: Option<CapacityDelegation>,
}

impl SessionRequest {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            ..Default::default()
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_resource_ability_requests(mut self, requests: Vec<ResourceAbilityRequest>) -> Self {
        self.resource_ability_requests = Some(requests);
        self
    }

    pub fn with_capacity_delegation(mut self, delegation: CapacityDelegation) -> Self {
        self.capacity_delegation = Some(delegation);
        self
    }
}

/// State of one authentication attempt
#[derive(Clone, Debug)]
pub enum AuthState {
    Idle,
    ChallengeReceived {
        nonce: String,
    },
    StatementSigned {
        statement: Box<SignInStatement>,
        auth_sig: AuthSig,
    },
    SessionGranted {
        expires_at: DateTime<Utc>,
    },
    Failed(String),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ChallengeReceived { .. } => "ChallengeReceived",
            Self::StatementSigned { .. } => "StatementSigned",
            Self::SessionGranted { .. } => "SessionGranted",
            Self::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionGranted { .. } | Self::Failed(_))
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Negotiates session credentials for one identity
#[derive(Clone)]
pub struct SessionAuthenticator {
    network: Arc<dyn KeyNetwork>,
    signer: Arc<dyn IdentitySigner>,
    domain: String,
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("identity", &self.signer.address())
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    pub fn new(network: Arc<dyn KeyNetwork>, signer: Arc<dyn IdentitySigner>) -> Self {
        Self {
            network,
            signer,
            domain: "localhost".to_string(),
        }
    }

    /// Domain written into sign-in statements
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn identity(&self) -> Address {
        self.signer.address()
    }

    /// Start a new attempt in the `Idle` state
    pub fn attempt(&self, request: SessionRequest) -> AuthAttempt<'_> {
        AuthAttempt {
            authenticator: self,
            request,
            state: AuthState::Idle,
        }
    }

    /// Run a complete attempt and return the granted session
    #[instrument(skip(self, request), fields(identity = %self.signer.address(), chain = %request.chain))]
    pub async fn get_session_sigs(&self, request: SessionRequest) -> Result<SessionCredential> {
        self.attempt(request).run().await
    }
}

/// A single authentication attempt
pub struct AuthAttempt<'a> {
    authenticator: &'a SessionAuthenticator,
    request: SessionRequest,
    state: AuthState,
}

impl AuthAttempt<'_> {
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Drive the attempt to a terminal state
    pub async fn run(mut self) -> Result<SessionCredential> {
        self.receive_challenge().await?;
        self.sign_statement().await?;
        self.submit().await
    }

    /// `Idle -> ChallengeReceived`: fetch a fresh nonce
    ///
    /// An incomplete or unusable request fails here, before the network is
    /// asked for a nonce.
    pub async fn receive_challenge(&mut self) -> Result<()> {
        self.expect_state("Idle")?;
        if let Err(e) = self.check_request() {
            return Err(self.fail(e));
        }
        match self.authenticator.network.latest_blockhash().await {
            Ok(nonce) => {
                debug!(%nonce, "received challenge");
                self.state = AuthState::ChallengeReceived { nonce };
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `ChallengeReceived -> StatementSigned`: build and sign the statement
    ///
    /// Missing fields, wildcard requests and an expiration already in the
    /// past are all rejected before the signer is asked for anything.
    pub async fn sign_statement(&mut self) -> Result<()> {
        let nonce = match &self.state {
            AuthState::ChallengeReceived { nonce } => nonce.clone(),
            other => {
                return Err(ClientError::InvalidRequest(format!(
                    "cannot sign a statement in state {}",
                    other
                )))
            }
        };

        let statement = match self.build_statement(nonce) {
            Ok(statement) => statement,
            Err(e) => return Err(self.fail(e)),
        };
        let message = match statement.to_message() {
            Ok(message) => message,
            Err(e) => return Err(self.fail(e.into())),
        };
        match AuthSig::sign(self.authenticator.signer.as_ref(), message).await {
            Ok(auth_sig) => {
                debug!(address = %auth_sig.address, "signed sign-in statement");
                self.state = AuthState::StatementSigned {
                    statement: Box::new(statement),
                    auth_sig,
                };
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// `StatementSigned -> SessionGranted`: exchange the signed statement
    pub async fn submit(&mut self) -> Result<SessionCredential> {
        let (statement, auth_sig) = match &self.state {
            AuthState::StatementSigned { statement, auth_sig } => (statement.clone(), auth_sig.clone()),
            other => {
                return Err(ClientError::InvalidRequest(format!(
                    "cannot submit a statement in state {}",
                    other
                )))
            }
        };

        let request = SessionSigsRequest {
            chain: self.request.chain.clone(),
            auth_sig,
            resource_ability_requests: statement.resource_ability_requests.clone(),
            expiration: statement.expiration_time,
            capacity_delegation: self.request.capacity_delegation.clone(),
        };
        let response = match self.authenticator.network.session_sigs(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };
        if response.session_sigs.is_empty() {
            return Err(self.fail(ClientError::AuthenticationRejected(
                "network returned no session signatures".to_string(),
            )));
        }

        let credential = SessionCredential {
            identity: statement.address,
            chain: self.request.chain.clone(),
            granted_abilities: response.granted.into_iter().collect(),
            expires_at: response.expiration,
            signatures: response.session_sigs,
        };
        info!(
            identity = %credential.identity,
            abilities = credential.granted_abilities.len(),
            nodes = credential.signatures.len(),
            expires_at = %credential.expires_at,
            "session granted"
        );
        self.state = AuthState::SessionGranted {
            expires_at: credential.expires_at,
        };
        Ok(credential)
    }

    // Local preconditions. Returns the EIP-155 chain id to sign for.
    fn check_request(&self) -> Result<u64> {
        let request = &self.request;
        let chain_id = siwe::chain_id(&request.chain)
            .ok_or_else(|| ClientError::InvalidRequest(format!("unknown chain {}", request.chain)))?;

        if request.uri.as_deref().map_or(true, |uri| uri.trim().is_empty()) {
            return Err(CryptoError::MissingRequiredField("uri").into());
        }
        let expiration = request
            .expiration
            .ok_or(CryptoError::MissingRequiredField("expiration"))?;
        let requests = match request.resource_ability_requests.as_deref() {
            Some(requests) if !requests.is_empty() => requests,
            _ => return Err(CryptoError::MissingRequiredField("resourceAbilityRequests").into()),
        };

        if let Some(wildcard) = requests.iter().find(|r| r.resource.is_wildcard()) {
            return Err(ClientError::InvalidRequest(format!(
                "refusing to request wildcard resource {}",
                wildcard.resource
            )));
        }
        if let Some(bad) = requests.iter().find(|r| !r.is_well_formed()) {
            return Err(ClientError::InvalidRequest(format!(
                "{} does not apply to {}",
                bad.ability.as_str(),
                bad.resource
            )));
        }
        if expiration <= Utc::now() {
            return Err(ClientError::SessionExpired(expiration));
        }
        Ok(chain_id)
    }

    fn build_statement(&self, nonce: String) -> Result<SignInStatement> {
        let request = &self.request;
        let chain_id = self.check_request()?;

        let mut builder = SignInStatement::builder(self.authenticator.identity(), nonce)
            .domain(self.authenticator.domain.clone())
            .chain_id(chain_id);
        if let Some(uri) = &request.uri {
            builder = builder.uri(uri.clone());
        }
        if let Some(expiration) = request.expiration {
            builder = builder.expiration(expiration);
        }
        if let Some(requests) = &request.resource_ability_requests {
            let mut requests = requests.clone();
            // A funded session also asks to spend the delegated credit
            if let Some(delegation) = &request.capacity_delegation {
                let spend = delegation.resource_ability();
                if !requests.contains(&spend) {
                    requests.push(spend);
                }
            }
            builder = builder.resource_ability_requests(requests);
        }
        let statement = builder.build()?;

        if statement.is_expired_at(Utc::now()) {
            return Err(ClientError::SessionExpired(statement.expiration_time));
        }
        Ok(statement)
    }

    fn expect_state(&self, name: &str) -> Result<()> {
        if self.state.name() != name {
            return Err(ClientError::InvalidRequest(format!(
                "expected state {}, attempt is {}",
                name, self.state
            )));
        }
        Ok(())
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        warn!(state = %self.state, error = %err, "authentication attempt failed");
        self.state = AuthState::Failed(err.to_string());
        err
    }
}
