//! Authenticated token issuance.
//!
//! A request moves through `AwaitingCredentials -> Authenticating ->
//! {Issued | Rejected}`. A request with missing fields stays in
//! `AwaitingCredentials` and is returned to the caller as
//! [`IssuanceOutcome::AwaitingCredentials`], not as an error.

use super::authenticator::{AuthError, Authenticator};
use crate::codec::{Token, TokenCodec, TokenPayload, MAX_USERNAME_LEN, OPCODE_LEN};
use crate::config::Config;
use crate::error::TokenError;
use crate::keys::KeyRing;
use crate::metrics;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Default budget for the directory round trip.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw issuance input as submitted by the presentation layer.
#[derive(Debug, Default)]
pub struct IssuanceRequest {
    /// Directory username. Empty counts as absent.
    pub username: Option<String>,
    /// Directory password. Empty counts as absent.
    pub password: Option<SecretString>,
    /// Operation code to bind into the token.
    pub opcode: Option<String>,
}

impl IssuanceRequest {
    /// A fully populated request.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        opcode: impl Into<String>,
    ) -> Self {
        let password: String = password.into();
        Self {
            username: Some(username.into()),
            password: Some(SecretString::from(password)),
            opcode: Some(opcode.into()),
        }
    }

    fn into_state(self) -> IssuanceState {
        use secrecy::ExposeSecret;

        let username = self.username.filter(|u| !u.is_empty());
        let password = self.password.filter(|p| !p.expose_secret().is_empty());

        match (username, password, self.opcode) {
            (Some(username), Some(password), Some(opcode)) => IssuanceState::Authenticating {
                username,
                password,
                opcode,
            },
            _ => IssuanceState::AwaitingCredentials,
        }
    }
}

enum IssuanceState {
    AwaitingCredentials,
    Authenticating {
        username: String,
        password: SecretString,
        opcode: String,
    },
}

/// A freshly minted token and what the caller needs to display it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The token.
    pub token: Token,
    /// Unix timestamp bound into the token.
    pub issued_at: i64,
    /// The payload that was signed.
    pub payload: TokenPayload,
    /// SPKI PEM of the key that verifies this token.
    pub public_key_pem: String,
}

/// Result of a successful pass through the gate.
#[derive(Debug, Clone)]
pub enum IssuanceOutcome {
    /// Some of username, password or opcode is missing; prompt again.
    AwaitingCredentials,
    /// Credentials accepted and a token minted.
    Issued(IssuedToken),
}

/// Mints tokens for users the directory service vouches for.
pub struct IssuanceGate {
    keys: Arc<KeyRing>,
    system_seed: String,
    authenticator: Arc<dyn Authenticator>,
    auth_timeout: Duration,
}

impl IssuanceGate {
    /// Create a gate.
    #[must_use]
    pub fn new(
        keys: Arc<KeyRing>,
        system_seed: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            keys,
            system_seed: system_seed.into(),
            authenticator,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Create a gate using the seed and timeout from `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        keys: Arc<KeyRing>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::new(keys, config.system_seed.clone(), authenticator)
            .with_auth_timeout(config.auth_timeout)
    }

    /// Set the directory round-trip budget.
    #[must_use]
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Run a request through the gate.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidOpcode`] / [`TokenError::InvalidUsername`] for
    ///   malformed input, checked before the directory is contacted
    /// - [`TokenError::AuthenticationFailed`] when the credentials are rejected
    /// - [`TokenError::AuthenticationUnavailable`] on timeout or outage
    /// - codec errors from minting the token
    pub async fn issue(&self, request: IssuanceRequest) -> Result<IssuanceOutcome, TokenError> {
        let (username, password, opcode) = match request.into_state() {
            IssuanceState::AwaitingCredentials => {
                debug!("Issuance request incomplete, awaiting credentials");
                return Ok(IssuanceOutcome::AwaitingCredentials);
            }
            IssuanceState::Authenticating {
                username,
                password,
                opcode,
            } => (username, password, opcode),
        };

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("issue", %request_id, %username, %opcode);

        let result: Result<IssuedToken, TokenError> = async {
            validate_opcode(&opcode)?;
            validate_username(&username)?;

            let identity = self.authenticate(&username, &password).await?;
            // The directory may canonicalise the name; the token binds its form
            validate_username(&identity.username)?;
            self.mint(&opcode, &identity.username)
        }
        .instrument(span)
        .await;

        match &result {
            Ok(_) => metrics::record_token_issued(),
            Err(e) => metrics::record_issuance_rejected(e.code()),
        }

        result.map(IssuanceOutcome::Issued)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<super::AuthenticatedIdentity, TokenError> {
        let call = self
            .authenticator
            .authenticate(username, password, self.auth_timeout);

        match tokio::time::timeout(self.auth_timeout, call).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(AuthError::InvalidCredentials)) => {
                warn!("Authentication rejected");
                Err(TokenError::AuthenticationFailed)
            }
            Ok(Err(AuthError::Unavailable(reason))) => {
                warn!(%reason, "Directory service unavailable");
                Err(TokenError::auth_unavailable(reason))
            }
            Err(_) => {
                warn!(timeout_ms = self.auth_timeout.as_millis() as u64, "Directory service timed out");
                Err(TokenError::auth_unavailable(format!(
                    "no answer within {:?}",
                    self.auth_timeout
                )))
            }
        }
    }

    fn mint(&self, opcode: &str, username: &str) -> Result<IssuedToken, TokenError> {
        let keys = self.keys.current();
        let issued_at = chrono::Utc::now().timestamp();

        let payload = TokenPayload::new(&self.system_seed, opcode, username, issued_at);
        let token = TokenCodec::encode_payload(&payload, keys.private_key())?;
        let public_key_pem = keys.public_key_pem()?;

        info!(
            issued_at,
            token = %token.fingerprint(),
            "Token issued"
        );

        Ok(IssuedToken {
            token,
            issued_at,
            payload,
            public_key_pem,
        })
    }
}

/// Opcodes are exactly [`OPCODE_LEN`] characters and are never padded:
/// padding would let distinct short opcodes collide.
fn validate_opcode(opcode: &str) -> Result<(), TokenError> {
    let len = opcode.chars().count();
    if len != OPCODE_LEN {
        return Err(TokenError::InvalidOpcode(format!(
            "opcode must be exactly {} characters, got {}",
            OPCODE_LEN, len
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), TokenError> {
    let len = username.chars().count();
    if len > MAX_USERNAME_LEN {
        return Err(TokenError::InvalidUsername(format!(
            "username must be at most {} characters, got {}",
            MAX_USERNAME_LEN, len
        )));
    }
    Ok(())
}
