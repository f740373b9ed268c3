//! Directory-service credential check, abstracted away from any protocol.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Identity confirmed by the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// Username as known to the directory.
    pub username: String,
}

/// Outcome of a failed credential check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong password; deliberately not distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Directory service could not be reached or answered with an error.
    #[error("directory service unavailable: {0}")]
    Unavailable(String),
}

/// Checks a username/password pair against a directory service.
///
/// `timeout` is the caller's budget for the round trip; implementations
/// should pass it on to their transport. The issuance gate enforces it
/// independently.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the credentials.
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<AuthenticatedIdentity, AuthError>;
}

/// In-memory authenticator for tests and local development.
#[derive(Default)]
pub struct MockAuthenticator {
    users: HashMap<String, String>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
}

impl MockAuthenticator {
    /// Create an authenticator with no users.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }

    /// Delay every answer, to simulate a slow directory.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle the simulated outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
        _timeout: Duration,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("connection refused".to_string()));
        }

        let matches = self.users.get(username).is_some_and(|expected| {
            bool::from(expected.as_bytes().ct_eq(password.expose_secret().as_bytes()))
        });

        if matches {
            Ok(AuthenticatedIdentity {
                username: username.to_string(),
            })
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let auth = MockAuthenticator::new().with_user("alice", "wonderland");
        let identity = auth
            .authenticate("alice", &secret("wonderland"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_the_same() {
        let auth = MockAuthenticator::new().with_user("alice", "wonderland");
        let unknown = auth
            .authenticate("mallory", &secret("wonderland"), Duration::from_secs(1))
            .await;
        let wrong = auth
            .authenticate("alice", &secret("guess"), Duration::from_secs(1))
            .await;
        assert_eq!(unknown, Err(AuthError::InvalidCredentials));
        assert_eq!(wrong, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_outage() {
        let auth = MockAuthenticator::new().with_user("alice", "wonderland");
        auth.set_unavailable(true);
        let result = auth
            .authenticate("alice", &secret("wonderland"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }
}
