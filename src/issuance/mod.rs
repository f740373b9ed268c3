//! Credential-gated token issuance.

pub mod authenticator;
pub mod gate;

pub use authenticator::{AuthError, AuthenticatedIdentity, Authenticator, MockAuthenticator};
pub use gate::{IssuanceGate, IssuanceOutcome, IssuanceRequest, IssuedToken, DEFAULT_AUTH_TIMEOUT};
