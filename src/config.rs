//! Issuer configuration.
//!
//! Loaded from environment variables (and `.env`) and validated once at
//! startup. The core only ever receives a validated [`Config`].

use crate::codec::{DELIMITER, SEED_LEN};
use crate::error::TokenError;
use crate::keys::{MAX_KEY_BITS, MIN_KEY_BITS};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default private key location.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "../key-private.pem";

/// Default public key location.
pub const DEFAULT_PUBLIC_KEY_FILE: &str = "../key-public.pem";

/// Default seed.
pub const DEFAULT_SYSTEM_SEED: &str = "AAAAAAAAAA";

/// Default modulus size for provisioning.
pub const DEFAULT_KEY_BITS: usize = 1024;

/// Issuer trust parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// PEM file holding the private key
    pub private_key_file: PathBuf,
    /// PEM file holding the public key
    pub public_key_file: PathBuf,
    /// RSA modulus size for newly provisioned pairs
    pub key_bits: usize,
    /// Issuer identity bound into every token
    pub system_seed: String,
    /// Budget for one directory-service round trip
    pub auth_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key_file: PathBuf::from(DEFAULT_PRIVATE_KEY_FILE),
            public_key_file: PathBuf::from(DEFAULT_PUBLIC_KEY_FILE),
            key_bits: DEFAULT_KEY_BITS,
            system_seed: DEFAULT_SYSTEM_SEED.to_string(),
            auth_timeout: crate::issuance::DEFAULT_AUTH_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Key files are overridden only as a pair, so a half-configured
    /// deployment never mixes a custom private key with the default
    /// public key.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if a variable cannot be parsed or the
    /// result fails [`Config::validate`].
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let (private_key_file, public_key_file) = match (
            non_empty_env("TOKEN_PRIVATE_KEY_FILE"),
            non_empty_env("TOKEN_PUBLIC_KEY_FILE"),
        ) {
            (Some(private), Some(public)) => (PathBuf::from(private), PathBuf::from(public)),
            (None, None) => (defaults.private_key_file, defaults.public_key_file),
            _ => {
                return Err(TokenError::config(
                    "TOKEN_PRIVATE_KEY_FILE and TOKEN_PUBLIC_KEY_FILE must be set together",
                ))
            }
        };

        let config = Self {
            private_key_file,
            public_key_file,
            key_bits: parse_env("TOKEN_KEY_BITS", defaults.key_bits)?,
            system_seed: non_empty_env("TOKEN_SYSTEM_SEED").unwrap_or(defaults.system_seed),
            auth_timeout: Duration::from_secs(parse_env(
                "TOKEN_AUTH_TIMEOUT_SECS",
                defaults.auth_timeout.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every field, including that both key files exist.
    ///
    /// A malformed seed is an error, never replaced by the default.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), TokenError> {
        validate_seed(&self.system_seed)?;

        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.key_bits) {
            return Err(TokenError::config(format!(
                "key_bits must be between {} and {}, got {}",
                MIN_KEY_BITS, MAX_KEY_BITS, self.key_bits
            )));
        }

        if self.auth_timeout.is_zero() {
            return Err(TokenError::config("auth_timeout must be greater than zero"));
        }

        require_file("private key", &self.private_key_file)?;
        require_file("public key", &self.public_key_file)
    }

    /// The verifier half of this configuration.
    #[must_use]
    pub fn verifier(&self) -> VerifierConfig {
        VerifierConfig {
            public_key_file: self.public_key_file.clone(),
        }
    }
}

/// Verifier configuration. A downstream consumer holds only the issuer's
/// public key, so nothing else is required.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// PEM file holding the issuer's public key
    pub public_key_file: PathBuf,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            public_key_file: PathBuf::from(DEFAULT_PUBLIC_KEY_FILE),
        }
    }
}

impl VerifierConfig {
    /// Load from `TOKEN_PUBLIC_KEY_FILE`. `TOKEN_PRIVATE_KEY_FILE` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the public key file does not exist.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let config = Self {
            public_key_file: non_empty_env("TOKEN_PUBLIC_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| Self::default().public_key_file),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the public key file exists.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] otherwise.
    pub fn validate(&self) -> Result<(), TokenError> {
        require_file("public key", &self.public_key_file)
    }
}

/// A seed is exactly [`SEED_LEN`] characters and free of the delimiter.
///
/// # Errors
///
/// Returns [`TokenError::Config`] otherwise.
pub fn validate_seed(seed: &str) -> Result<(), TokenError> {
    let len = seed.chars().count();
    if len != SEED_LEN {
        return Err(TokenError::config(format!(
            "system_seed must be exactly {} characters, got {}",
            SEED_LEN, len
        )));
    }
    if seed.contains(DELIMITER) {
        return Err(TokenError::config(format!(
            "system_seed must not contain '{}'",
            DELIMITER
        )));
    }
    Ok(())
}

fn require_file(name: &str, path: &Path) -> Result<(), TokenError> {
    if !path.is_file() {
        return Err(TokenError::config(format!(
            "{} file {} does not exist",
            name,
            path.display()
        )));
    }
    Ok(())
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, TokenError>
where
    T::Err: std::fmt::Display,
{
    match non_empty_env(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| TokenError::config(format!("Invalid {}: {}", name, e))),
        None => Ok(default),
    }
}
