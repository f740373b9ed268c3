//! Signed token envelope: base64 of the raw RSA signature over the canonical
//! payload.

use super::payload::TokenPayload;
use crate::error::TokenError;
use crate::keys::store::{self, MAX_KEY_BITS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Longest envelope accepted: padded base64 of a [`MAX_KEY_BITS`] signature.
pub const MAX_TOKEN_LEN: usize = (MAX_KEY_BITS / 8).div_ceil(3) * 4;

/// An issued token. Not secret: anyone holding the public key can read it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wraps an encoded token string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 prefix, safe to put in logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        Sha256::digest(self.0.as_bytes())[..6]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

/// Stateless encoder/decoder between [`TokenPayload`] and [`Token`].
pub struct TokenCodec;

impl TokenCodec {
    /// Builds, signs and encodes the payload for the given fields.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::PayloadFormat`] if a field contains the
    /// delimiter, and propagates [`TokenError::Signing`].
    pub fn encode(
        seed: &str,
        opcode: &str,
        username: &str,
        issued_at: i64,
        private_key: &RsaPrivateKey,
    ) -> Result<Token, TokenError> {
        Self::encode_payload(
            &TokenPayload::new(seed, opcode, username, issued_at),
            private_key,
        )
    }

    /// Signs and encodes an already-built payload.
    ///
    /// # Errors
    ///
    /// Same as [`Self::encode`].
    pub fn encode_payload(
        payload: &TokenPayload,
        private_key: &RsaPrivateKey,
    ) -> Result<Token, TokenError> {
        let canonical = payload.canonical()?;
        let signature = store::sign(private_key, canonical.as_bytes())?;
        Ok(Token(STANDARD.encode(signature)))
    }

    /// Verifies a token and parses its payload.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::TokenFormat`] when the envelope is not valid
    /// base64 or the recovered message is not a four-field payload, and
    /// [`TokenError::Verification`] when the signature is not valid under
    /// `public_key`.
    pub fn decode(token: &str, public_key: &RsaPublicKey) -> Result<TokenPayload, TokenError> {
        let signature = decode_envelope(token)?;
        let message = store::verify(public_key, &signature)?;

        let text = String::from_utf8(message)
            .map_err(|_| TokenError::token_format("recovered payload is not UTF-8"))?;
        let payload = TokenPayload::parse(&text)?;

        debug!(
            opcode = %payload.opcode,
            username = %payload.username,
            issued_at = payload.issued_at,
            "Decoded token"
        );

        Ok(payload)
    }
}

fn decode_envelope(token: &str) -> Result<Vec<u8>, TokenError> {
    let token = token.trim();

    if token.is_empty() {
        return Err(TokenError::token_format("token is empty"));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(TokenError::token_format(format!(
            "token is {} characters, at most {} allowed",
            token.len(),
            MAX_TOKEN_LEN
        )));
    }
    if let Some(c) = token
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
    {
        return Err(TokenError::token_format(format!(
            "token contains disallowed character {:?}",
            c
        )));
    }

    STANDARD
        .decode(token)
        .map_err(|e| TokenError::token_format(format!("invalid base64: {}", e)))
}
