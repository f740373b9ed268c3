//! Opcode token issuer.
//!
//! Issues short RSA-signed tokens binding an operation code, an
//! authenticated username, the issuing server's seed and the issuance time,
//! and verifies them offline with the public key alone.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod issuance;
pub mod keys;
pub mod metrics;
pub mod tracing_config;
pub mod verification;

// Re-exports for convenience
pub use codec::{Token, TokenCodec, TokenPayload};
pub use config::{Config, VerifierConfig};
pub use error::TokenError;
pub use issuance::{Authenticator, IssuanceGate, IssuanceOutcome, IssuanceRequest, IssuedToken};
pub use keys::{KeyMaterial, KeyPairProvisioner, KeyRing};
pub use verification::{VerificationService, VerifiedTokenView};
