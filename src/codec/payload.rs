//! The cleartext payload and its canonical `seed:opcode:username:issuedAt`
//! serialization.

use super::{DELIMITER, MAX_ISSUED_AT};
use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four fields bound into a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Identifies the issuing server instance.
    pub system_seed: String,
    /// Operation the token authorizes.
    pub opcode: String,
    /// Authenticated identity.
    pub username: String,
    /// Unix timestamp (seconds) captured at signing time.
    pub issued_at: i64,
}

impl TokenPayload {
    /// Creates a payload. Nothing is validated until [`Self::canonical`].
    #[must_use]
    pub fn new(
        system_seed: impl Into<String>,
        opcode: impl Into<String>,
        username: impl Into<String>,
        issued_at: i64,
    ) -> Self {
        Self {
            system_seed: system_seed.into(),
            opcode: opcode.into(),
            username: username.into(),
            issued_at,
        }
    }

    /// Canonical string that gets signed.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::PayloadFormat`] if a field contains the
    /// delimiter or the timestamp is out of range.
    pub fn canonical(&self) -> Result<String, TokenError> {
        for (name, value) in self.text_fields() {
            if value.contains(DELIMITER) {
                return Err(TokenError::payload_format(format!(
                    "{} contains reserved delimiter '{}'",
                    name, DELIMITER
                )));
            }
        }

        if !(0..=MAX_ISSUED_AT).contains(&self.issued_at) {
            return Err(TokenError::payload_format(format!(
                "issued_at {} is out of range",
                self.issued_at
            )));
        }

        Ok(self.to_string())
    }

    /// Parses a canonical payload string recovered from a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::TokenFormat`] unless `s` splits into exactly four
    /// fields and the last is a canonical decimal timestamp.
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let fields: Vec<&str> = s.split(DELIMITER).collect();
        let [system_seed, opcode, username, issued_at] = fields.as_slice() else {
            return Err(TokenError::token_format(format!(
                "payload has {} fields, expected 4",
                fields.len()
            )));
        };

        Ok(Self::new(
            *system_seed,
            *opcode,
            *username,
            parse_timestamp(issued_at)?,
        ))
    }

    fn text_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("system_seed", &self.system_seed),
            ("opcode", &self.opcode),
            ("username", &self.username),
        ]
    }
}

/// Joins the fields without validation; use [`TokenPayload::canonical`] when
/// the output is going to be signed.
impl fmt::Display for TokenPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            self.system_seed,
            self.opcode,
            self.username,
            self.issued_at,
            d = DELIMITER
        )
    }
}

/// Accepts only what `i64::to_string` would produce for an in-range value:
/// ASCII digits, no sign, no leading zeros.
fn parse_timestamp(s: &str) -> Result<i64, TokenError> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if !canonical {
        return Err(TokenError::token_format(format!(
            "issued_at '{}' is not a canonical decimal timestamp",
            s
        )));
    }

    s.parse::<i64>()
        .ok()
        .filter(|ts| *ts <= MAX_ISSUED_AT)
        .ok_or_else(|| TokenError::token_format(format!("issued_at '{}' is out of range", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout() {
        let payload = TokenPayload::new("AAAAAAAAAA", "OP20220101", "alice", 1_700_000_000);
        assert_eq!(
            payload.canonical().unwrap(),
            "AAAAAAAAAA:OP20220101:alice:1700000000"
        );
    }

    #[test]
    fn test_canonical_rejects_delimiter_in_any_field() {
        let cases = [
            TokenPayload::new("AAAA:AAAAA", "OP20220101", "alice", 1),
            TokenPayload::new("AAAAAAAAAA", "OP2022:101", "alice", 1),
            TokenPayload::new("AAAAAAAAAA", "OP20220101", "al:ce", 1),
        ];
        for payload in cases {
            assert!(matches!(payload.canonical(), Err(TokenError::PayloadFormat(_))));
        }
    }

    #[test]
    fn test_canonical_rejects_negative_timestamp() {
        let payload = TokenPayload::new("AAAAAAAAAA", "OP20220101", "alice", -1);
        assert!(matches!(payload.canonical(), Err(TokenError::PayloadFormat(_))));
    }

    #[test]
    fn test_parse_round_trip() {
        let payload = TokenPayload::new("AAAAAAAAAA", "OP20220101", "alice", 1_700_000_000);
        let parsed = TokenPayload::parse(&payload.canonical().unwrap()).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_parse_allows_empty_fields() {
        let parsed = TokenPayload::parse("AAAAAAAAAA:::0").unwrap();
        assert_eq!(parsed.opcode, "");
        assert_eq!(parsed.username, "");
        assert_eq!(parsed.issued_at, 0);
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        for s in ["", "a:b:c", "a:b:c:1:e", "no delimiters"] {
            assert!(matches!(TokenPayload::parse(s), Err(TokenError::TokenFormat(_))), "{s}");
        }
    }

    #[test]
    fn test_parse_rejects_non_canonical_timestamp() {
        for ts in ["", "01700000000", "+1700000000", "-1", "17e8", " 1700000000", "99999999999999999999"] {
            let s = format!("AAAAAAAAAA:OP20220101:alice:{}", ts);
            assert!(matches!(TokenPayload::parse(&s), Err(TokenError::TokenFormat(_))), "{ts}");
        }
    }
}
