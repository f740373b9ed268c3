//! Offline token verification with derived display fields.

use crate::codec::{TokenCodec, TokenPayload};
use crate::error::TokenError;
use crate::keys::{load_public_key, KeyRing};
use crate::metrics;
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Format of [`VerifiedTokenView::issued_at_display`].
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// A verified token's payload plus read-only derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedTokenView {
    /// The recovered payload.
    pub payload: TokenPayload,
    /// `issued_at` as a UTC date-time.
    pub issued_at_utc: DateTime<Utc>,
    /// `issued_at` rendered with [`DISPLAY_FORMAT`].
    pub issued_at_display: String,
    /// Seconds between issuance and verification. Negative if the issuer's
    /// clock is ahead of ours.
    pub age_secs: i64,
    /// The canonical payload string that was signed.
    pub cleartext: String,
}

enum VerifyingKey {
    /// Public half of the issuer's own ring; follows rotation.
    Ring(Arc<KeyRing>),
    /// A public key handed to a downstream consumer.
    Public(RsaPublicKey),
}

/// Verifies tokens using only a public key.
pub struct VerificationService {
    key: VerifyingKey,
}

impl VerificationService {
    /// Create a verifier that uses the public half of the ring's active pair.
    #[must_use]
    pub fn new(keys: Arc<KeyRing>) -> Self {
        Self {
            key: VerifyingKey::Ring(keys),
        }
    }

    /// Create a verifier from a public key alone.
    #[must_use]
    pub fn from_public_key(public_key: RsaPublicKey) -> Self {
        Self {
            key: VerifyingKey::Public(public_key),
        }
    }

    /// Create a verifier from a public key PEM file.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if the file cannot be loaded.
    pub fn from_public_key_file(public_key_file: impl AsRef<Path>) -> Result<Self, TokenError> {
        Ok(Self::from_public_key(load_public_key(public_key_file)?))
    }

    /// Verify `token` against the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_at`].
    pub fn verify(&self, token: &str) -> Result<VerifiedTokenView, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify `token`, computing its age relative to `now`.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenError::TokenFormat`] and [`TokenError::Verification`]
    /// from the codec unchanged.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedTokenView, TokenError> {
        let decoded = match &self.key {
            VerifyingKey::Ring(ring) => TokenCodec::decode(token, ring.current().public_key()),
            VerifyingKey::Public(public_key) => TokenCodec::decode(token, public_key),
        };

        let payload = match decoded {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Token verification failed");
                metrics::record_verification(e.code());
                return Err(e);
            }
        };

        // The codec bounds issued_at to 0..=9999-12-31, always representable.
        let issued_at_utc = DateTime::<Utc>::from_timestamp(payload.issued_at, 0)
            .ok_or_else(|| TokenError::Internal(format!("timestamp {} out of range", payload.issued_at)))?;
        let age_secs = now - payload.issued_at;

        info!(
            opcode = %payload.opcode,
            username = %payload.username,
            age_secs,
            "Token verified"
        );
        metrics::record_verification("OK");

        Ok(VerifiedTokenView {
            issued_at_display: issued_at_utc.format(DISPLAY_FORMAT).to_string(),
            issued_at_utc,
            age_secs,
            cleartext: payload.to_string(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyMaterial;

    fn service() -> (VerificationService, Arc<KeyRing>) {
        let ring = Arc::new(KeyRing::new(KeyMaterial::generate(512).unwrap()));
        (VerificationService::new(Arc::clone(&ring)), ring)
    }

    #[test]
    fn test_derived_fields() {
        let (service, ring) = service();
        let keys = ring.current();
        let token = TokenCodec::encode("AAAAAAAAAA", "OP20220101", "alice", 1_700_000_000, keys.private_key())
            .unwrap();

        let view = service.verify_at(token.as_str(), 1_700_003_600).unwrap();
        assert_eq!(view.age_secs, 3600);
        assert_eq!(view.issued_at_display, "2023-11-14 22:13:20 UTC");
        assert_eq!(view.cleartext, "AAAAAAAAAA:OP20220101:alice:1700000000");
        assert_eq!(view.payload.username, "alice");
    }

    #[test]
    fn test_verification_follows_rotation() {
        let (service, ring) = service();
        let old = ring.current();
        let token = TokenCodec::encode("AAAAAAAAAA", "OP20220101", "alice", 1, old.private_key()).unwrap();

        assert!(service.verify(token.as_str()).is_ok());
        ring.rotate(KeyMaterial::generate(512).unwrap());
        assert!(service.verify(token.as_str()).is_err());
    }

    #[test]
    fn test_public_key_alone_verifies() {
        let keys = KeyMaterial::generate(512).unwrap();
        let token = TokenCodec::encode("AAAAAAAAAA", "OP20220101", "alice", 1, keys.private_key()).unwrap();

        let service = VerificationService::from_public_key(keys.public_key().clone());
        assert_eq!(service.verify_at(token.as_str(), 1).unwrap().payload.username, "alice");
    }
}
