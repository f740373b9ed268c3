//! Error types for token issuance and verification.
//!
//! Every failure the core can produce is a typed variant of [`TokenError`].
//! Nothing is recovered silently: callers receive the variant and decide how
//! to present it.

use thiserror::Error;

/// Errors produced by the key store, codec, issuance gate and verifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Key file missing, unreadable, or not a PEM-encoded RSA key.
    #[error("Key load error: {0}")]
    KeyLoad(String),

    /// Key pair could not be generated.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Signing failed (invalid key or message above the key's ceiling).
    #[error("Signing error: {0}")]
    Signing(String),

    /// Signature does not correspond to any message under the public key.
    #[error("Verification error: {0}")]
    Verification(String),

    /// A payload field contains the reserved delimiter.
    #[error("Payload format error: {0}")]
    PayloadFormat(String),

    /// Token is not a valid envelope or the recovered payload is malformed.
    #[error("Token format error: {0}")]
    TokenFormat(String),

    /// Opcode is not exactly [`crate::codec::OPCODE_LEN`] characters.
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(String),

    /// Username is empty or longer than [`crate::codec::MAX_USERNAME_LEN`].
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Directory service rejected the credentials.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Directory service timed out or could not be reached.
    #[error("Authentication unavailable: {0}")]
    AuthenticationUnavailable(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Create a key load error.
    #[must_use]
    pub fn key_load(msg: impl Into<String>) -> Self {
        Self::KeyLoad(msg.into())
    }

    /// Create a key generation error.
    #[must_use]
    pub fn key_generation(msg: impl Into<String>) -> Self {
        Self::KeyGeneration(msg.into())
    }

    /// Create a signing error.
    #[must_use]
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    /// Create a payload format error.
    #[must_use]
    pub fn payload_format(msg: impl Into<String>) -> Self {
        Self::PayloadFormat(msg.into())
    }

    /// Create a token format error.
    #[must_use]
    pub fn token_format(msg: impl Into<String>) -> Self {
        Self::TokenFormat(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication unavailable error.
    #[must_use]
    pub fn auth_unavailable(msg: impl Into<String>) -> Self {
        Self::AuthenticationUnavailable(msg.into())
    }

    /// Only an unreachable directory service is worth retrying. The core
    /// itself never retries; this is a hint for the orchestration layer.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthenticationUnavailable(_))
    }

    /// Stable error code for reporting to callers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::KeyLoad(_) => TOKEN_KEY_LOAD_ERROR,
            Self::KeyGeneration(_) => TOKEN_KEY_GENERATION_ERROR,
            Self::Signing(_) => TOKEN_SIGNING_ERROR,
            Self::Verification(_) => TOKEN_VERIFICATION_FAILED,
            Self::PayloadFormat(_) => TOKEN_PAYLOAD_FORMAT,
            Self::TokenFormat(_) => TOKEN_MALFORMED,
            Self::InvalidOpcode(_) => TOKEN_INVALID_OPCODE,
            Self::InvalidUsername(_) => TOKEN_INVALID_USERNAME,
            Self::AuthenticationFailed => TOKEN_AUTH_FAILED,
            Self::AuthenticationUnavailable(_) => TOKEN_AUTH_UNAVAILABLE,
            Self::Config(_) => TOKEN_CONFIG_ERROR,
            Self::Internal(_) => TOKEN_INTERNAL_ERROR,
        }
    }
}

// Error codes reported to callers
pub const TOKEN_KEY_LOAD_ERROR: &str = "TOKEN_KEY_LOAD_ERROR";
pub const TOKEN_KEY_GENERATION_ERROR: &str = "TOKEN_KEY_GENERATION_ERROR";
pub const TOKEN_SIGNING_ERROR: &str = "TOKEN_SIGNING_ERROR";
pub const TOKEN_VERIFICATION_FAILED: &str = "TOKEN_VERIFICATION_FAILED";
pub const TOKEN_PAYLOAD_FORMAT: &str = "TOKEN_PAYLOAD_FORMAT";
pub const TOKEN_MALFORMED: &str = "TOKEN_MALFORMED";
pub const TOKEN_INVALID_OPCODE: &str = "TOKEN_INVALID_OPCODE";
pub const TOKEN_INVALID_USERNAME: &str = "TOKEN_INVALID_USERNAME";
pub const TOKEN_AUTH_FAILED: &str = "TOKEN_AUTH_FAILED";
pub const TOKEN_AUTH_UNAVAILABLE: &str = "TOKEN_AUTH_UNAVAILABLE";
pub const TOKEN_CONFIG_ERROR: &str = "TOKEN_CONFIG_ERROR";
pub const TOKEN_INTERNAL_ERROR: &str = "TOKEN_INTERNAL_ERROR";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(TokenError::auth_unavailable("timeout").is_retryable());
        assert!(!TokenError::AuthenticationFailed.is_retryable());
        assert!(!TokenError::verification("bad").is_retryable());
        assert!(!TokenError::token_format("bad").is_retryable());
    }

    #[test]
    fn test_auth_failures_are_distinct() {
        let failed = TokenError::AuthenticationFailed;
        let unavailable = TokenError::auth_unavailable("ldap down");

        assert_ne!(failed, unavailable);
        assert_ne!(failed.code(), unavailable.code());
        assert_ne!(failed.to_string(), unavailable.to_string());
    }

    #[test]
    fn test_auth_failed_message_has_no_detail() {
        assert_eq!(TokenError::AuthenticationFailed.to_string(), "Authentication failed");
    }

    #[test]
    fn test_error_display() {
        let err = TokenError::payload_format("opcode contains ':'");
        assert_eq!(err.to_string(), "Payload format error: opcode contains ':'");
        assert_eq!(err.code(), TOKEN_PAYLOAD_FORMAT);
    }
}
