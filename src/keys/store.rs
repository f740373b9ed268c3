//! RSA key material and the raw sign/recover primitives.
//!
//! Tokens are produced with PKCS#1 v1.5 type-1 padding applied directly to
//! the message (no digest, no DigestInfo prefix), so the public key operation
//! recovers the original bytes. Output is byte-compatible with
//! `openssl pkeyutl -sign` run without a digest.

use crate::error::TokenError;
use crate::metrics;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

/// Smallest modulus accepted for generation.
pub const MIN_KEY_BITS: usize = 512;

/// Largest modulus accepted; the `rsa` crate refuses bigger public keys.
pub const MAX_KEY_BITS: usize = 4096;

/// Bytes of PKCS#1 v1.5 overhead: `00 01 <at least 8 x FF> 00`.
const PADDING_OVERHEAD: usize = 11;

const MIN_FILLER_LEN: usize = 8;

/// An RSA key pair loaded once and shared read-only afterwards.
///
/// The private half never leaves this type except through
/// [`KeyMaterial::private_key_pem`], which the provisioner uses for export.
#[derive(Clone)]
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyMaterial {
    /// Pair an already-parsed private and public key.
    ///
    /// The two halves are not checked against each other; a mismatched pair
    /// produces tokens that fail verification.
    #[must_use]
    pub fn new(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Self {
        Self {
            private_key,
            public_key,
        }
    }

    /// Load a key pair from PEM files.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if either file is missing, unreadable,
    /// or not a PEM-encoded RSA key.
    pub fn load(
        private_key_file: impl AsRef<Path>,
        public_key_file: impl AsRef<Path>,
    ) -> Result<Self, TokenError> {
        let private_key_file = private_key_file.as_ref();
        let public_key_file = public_key_file.as_ref();

        let private_pem = read_pem(private_key_file, "private")?;
        let public_pem = read_pem(public_key_file, "public")?;
        let material = Self::from_pem(&private_pem, &public_pem)?;

        debug!(
            private_key_file = %private_key_file.display(),
            public_key_file = %public_key_file.display(),
            bits = material.bits(),
            "Loaded key pair"
        );

        Ok(material)
    }

    /// Parse a key pair from PEM text. PKCS#8/SPKI and PKCS#1 are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if either half fails to parse.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, TokenError> {
        Ok(Self::new(
            parse_private_key_pem(private_pem)?,
            parse_public_key_pem(public_pem)?,
        ))
    }

    /// Generate a fresh key pair in memory.
    ///
    /// Sizes below 2048 bits are allowed: shorter keys give shorter tokens,
    /// which is a trade-off the operator opts into.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyGeneration`] if `bits` is outside
    /// [`MIN_KEY_BITS`]..=[`MAX_KEY_BITS`] or generation fails.
    pub fn generate(bits: usize) -> Result<Self, TokenError> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
            return Err(TokenError::key_generation(format!(
                "key size {} bits is outside {}..={}",
                bits, MIN_KEY_BITS, MAX_KEY_BITS
            )));
        }

        let started = Instant::now();
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| TokenError::key_generation(e.to_string()))?;
        let public_key = private_key.to_public_key();
        metrics::record_rsa_operation("generate", started.elapsed().as_secs_f64());

        debug!(bits, "Generated key pair");
        Ok(Self::new(private_key, public_key))
    }

    /// The private half.
    #[must_use]
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public half.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Modulus size of the private key in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.private_key.n().bits()
    }

    /// Longest message the private key can sign.
    #[must_use]
    pub fn max_payload_len(&self) -> usize {
        max_message_len(self.private_key.size())
    }

    /// Sign `message` with the private half.
    ///
    /// # Errors
    ///
    /// See [`sign`].
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TokenError> {
        sign(&self.private_key, message)
    }

    /// Recover the message from `signature` with the public half.
    ///
    /// # Errors
    ///
    /// See [`verify`].
    pub fn verify(&self, signature: &[u8]) -> Result<Vec<u8>, TokenError> {
        verify(&self.public_key, signature)
    }

    /// Private key as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] if encoding fails.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>, TokenError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| TokenError::Internal(format!("private key PEM encoding: {}", e)))
    }

    /// Public key as SPKI PEM.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] if encoding fails.
    pub fn public_key_pem(&self) -> Result<String, TokenError> {
        public_key_pem(&self.public_key)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Sign `message` as-is with PKCS#1 v1.5 type-1 padding.
///
/// The result is deterministic for a given key and always exactly the
/// modulus size in length.
///
/// # Errors
///
/// Returns [`TokenError::Signing`] if the message exceeds the key's ceiling
/// (modulus bytes minus 11) or the RSA operation fails.
pub fn sign(private_key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let ceiling = max_message_len(private_key.size());
    if message.len() > ceiling {
        return Err(TokenError::signing(format!(
            "message is {} bytes, key allows at most {}",
            message.len(),
            ceiling
        )));
    }

    let started = Instant::now();
    let signature = private_key
        .sign(Pkcs1v15Sign::new_unprefixed(), message)
        .map_err(|e| TokenError::signing(e.to_string()))?;
    metrics::record_rsa_operation("sign", started.elapsed().as_secs_f64());

    Ok(signature)
}

/// Recover the signed message from `signature`.
///
/// # Errors
///
/// Returns [`TokenError::Verification`] if the signature has the wrong
/// length, is out of range for the modulus, or does not unpad to a valid
/// type-1 block.
pub fn verify(public_key: &RsaPublicKey, signature: &[u8]) -> Result<Vec<u8>, TokenError> {
    let k = public_key.size();
    if signature.len() != k {
        return Err(TokenError::verification(format!(
            "signature is {} bytes, expected {}",
            signature.len(),
            k
        )));
    }

    let started = Instant::now();
    let s = BigUint::from_bytes_be(signature);
    if &s >= public_key.n() {
        return Err(TokenError::verification("signature out of range for modulus"));
    }
    let m = s.modpow(public_key.e(), public_key.n()).to_bytes_be();
    metrics::record_rsa_operation("verify", started.elapsed().as_secs_f64());

    // m < n, so it always fits in k bytes
    let mut em = vec![0u8; k - m.len()];
    em.extend_from_slice(&m);

    strip_signature_padding(&em)
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM.
///
/// # Errors
///
/// Returns [`TokenError::KeyLoad`] if neither encoding parses.
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::key_load(format!("not a PEM-encoded RSA private key: {}", e)))
}

/// Parse an RSA public key from SPKI or PKCS#1 PEM.
///
/// # Errors
///
/// Returns [`TokenError::KeyLoad`] if neither encoding parses.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, TokenError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::key_load(format!("not a PEM-encoded RSA public key: {}", e)))
}

/// Load only the public half from a PEM file, for verifiers that are never
/// given the private key.
///
/// # Errors
///
/// Returns [`TokenError::KeyLoad`] if the file is missing, unreadable, or
/// not a PEM-encoded RSA public key.
pub fn load_public_key(public_key_file: impl AsRef<Path>) -> Result<RsaPublicKey, TokenError> {
    let public_key_file = public_key_file.as_ref();
    let public_key = parse_public_key_pem(&read_pem(public_key_file, "public")?)?;

    debug!(
        public_key_file = %public_key_file.display(),
        bits = public_key.n().bits(),
        "Loaded public key"
    );

    Ok(public_key)
}

/// Encode a public key as SPKI PEM.
///
/// # Errors
///
/// Returns [`TokenError::Internal`] if encoding fails.
pub fn public_key_pem(public_key: &RsaPublicKey) -> Result<String, TokenError> {
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| TokenError::Internal(format!("public key PEM encoding: {}", e)))
}

/// Longest message a key of `modulus_len` bytes can sign.
#[must_use]
pub const fn max_message_len(modulus_len: usize) -> usize {
    modulus_len.saturating_sub(PADDING_OVERHEAD)
}

fn read_pem(path: &Path, which: &str) -> Result<String, TokenError> {
    fs::read_to_string(path).map_err(|e| {
        TokenError::key_load(format!(
            "cannot read {} key file {}: {}",
            which,
            path.display(),
            e
        ))
    })
}

fn strip_signature_padding(em: &[u8]) -> Result<Vec<u8>, TokenError> {
    let invalid = || TokenError::verification("signature does not match any message under this key");

    if em.len() < PADDING_OVERHEAD || em[0] != 0x00 || em[1] != 0x01 {
        return Err(invalid());
    }

    let filler_len = em[2..].iter().take_while(|&&b| b == 0xff).count();
    let separator = 2 + filler_len;
    if filler_len < MIN_FILLER_LEN || em.get(separator) != Some(&0x00) {
        return Err(invalid());
    }

    Ok(em[separator + 1..].to_vec())
}
