//! SHA-256 digest in its wire form: exactly 64 lowercase hex characters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ZkbError;
use crate::limits::HASH_HEX_LENGTH;

/// A 256-bit digest, always stored as 64 lowercase hex chars.
///
/// Parsing trims surrounding whitespace and lowercases; nothing else is
/// normalised. Any other deviation is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a hex digest, accepting surrounding whitespace and uppercase.
    pub fn parse(s: &str) -> Result<Self, ZkbError> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.len() != HASH_HEX_LENGTH {
            return Err(ZkbError::InvalidDigest(format!(
                "expected {HASH_HEX_LENGTH} hex characters, got {}",
                normalized.len()
            )));
        }
        if !normalized.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(ZkbError::InvalidDigest(
                "digest must contain only hex characters".into(),
            ));
        }
        Ok(Self(normalized))
    }

    /// Build from raw digest bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `s` parses to this digest.
    pub fn matches(&self, s: &str) -> bool {
        Digest::parse(s).map(|d| d == *self).unwrap_or(false)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = ZkbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = ZkbError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Digest::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let d = Digest::parse(&format!("  {}\n", EMPTY_SHA256.to_uppercase())).unwrap();
        assert_eq!(d.as_str(), EMPTY_SHA256);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Digest::parse(&EMPTY_SHA256[..63]).is_err());
        assert!(Digest::parse(&format!("{EMPTY_SHA256}0")).is_err());
        assert!(Digest::parse("").is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        let bad = format!("{}g", &EMPTY_SHA256[..63]);
        assert!(Digest::parse(&bad).is_err());
    }

    #[test]
    fn from_bytes_is_lowercase_hex() {
        let d = Digest::from_bytes(&[0xAB; 32]);
        assert_eq!(d.as_str(), "ab".repeat(32));
    }

    #[test]
    fn serde_rejects_invalid() {
        let ok: Digest = serde_json::from_str(&format!("\"{EMPTY_SHA256}\"")).unwrap();
        assert_eq!(ok.as_str(), EMPTY_SHA256);
        assert!(serde_json::from_str::<Digest>("\"abc\"").is_err());
    }

    #[test]
    fn matches_ignores_case() {
        let d = Digest::parse(EMPTY_SHA256).unwrap();
        assert!(d.matches(&EMPTY_SHA256.to_uppercase()));
        assert!(!d.matches(&"0".repeat(64)));
    }
}
