//! Token payload construction and the encode/decode path.

pub mod payload;
pub mod token;

pub use payload::TokenPayload;
pub use token::{Token, TokenCodec};

/// Reserved field separator in the canonical payload.
pub const DELIMITER: char = ':';

/// Length of a system seed in the reference trust domain.
pub const SEED_LEN: usize = 10;

/// Length of a non-empty opcode.
pub const OPCODE_LEN: usize = 10;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 20;

/// Latest representable issuance time, 9999-12-31T23:59:59Z.
pub const MAX_ISSUED_AT: i64 = 253_402_300_799;
