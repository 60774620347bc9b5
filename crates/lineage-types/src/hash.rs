use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// SHA-256 content hash in the canonical `"sha256:<hex>"` form.
///
/// Construction always validates the algorithm prefix and the 64-digit
/// hex digest, and normalizes the digest to lowercase. A `ContentHash`
/// value is therefore always well formed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Algorithm prefix carried by every hash string.
    pub const PREFIX: &'static str = "sha256:";

    /// Length of the hex-encoded SHA-256 digest.
    pub const DIGEST_HEX_LEN: usize = 64;

    /// Parse and validate a hash string.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidHash {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let digest = value
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| invalid("missing sha256: prefix"))?;
        if digest.len() != Self::DIGEST_HEX_LEN {
            return Err(invalid(&format!(
                "expected {} hex digits, got {}",
                Self::DIGEST_HEX_LEN,
                digest.len()
            )));
        }
        if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("digest is not hexadecimal"));
        }

        Ok(Self(format!("{}{}", Self::PREFIX, digest.to_ascii_lowercase())))
    }

    /// Build a hash from a raw 32-byte SHA-256 digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex::encode(digest)))
    }

    /// The full `sha256:<hex>` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the algorithm prefix.
    pub fn digest_hex(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }

    /// Short representation (first 8 digest characters).
    pub fn short_hex(&self) -> &str {
        &self.digest_hex()[..8]
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> String {
        format!("sha256:{}", "a".repeat(64))
    }

    #[test]
    fn parses_canonical_form() {
        let hash = ContentHash::parse(&sample()).unwrap();
        assert_eq!(hash.as_str(), sample());
        assert_eq!(hash.digest_hex(), "a".repeat(64));
        assert_eq!(hash.short_hex(), "aaaaaaaa");
    }

    #[test]
    fn uppercase_digest_is_normalized() {
        let hash = ContentHash::parse(&format!("sha256:{}", "AB".repeat(32))).unwrap();
        assert_eq!(hash.digest_hex(), "ab".repeat(32));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let result = ContentHash::parse(&"a".repeat(64));
        assert!(matches!(result, Err(TypeError::InvalidHash { .. })));
    }

    #[test]
    fn other_algorithm_is_rejected() {
        let result = ContentHash::parse(&format!("md5:{}", "a".repeat(32)));
        assert!(result.is_err());
    }

    #[test]
    fn short_digest_is_rejected() {
        assert!(ContentHash::parse("sha256:abc").is_err());
    }

    #[test]
    fn non_hex_digest_is_rejected() {
        assert!(ContentHash::parse(&format!("sha256:{}", "z".repeat(64))).is_err());
    }

    #[test]
    fn from_digest_matches_parse() {
        let hash = ContentHash::from_digest([0xab; 32]);
        assert_eq!(hash, ContentHash::parse(&format!("sha256:{}", "ab".repeat(32))).unwrap());
    }

    #[test]
    fn serde_uses_string_form_and_validates() {
        let hash = ContentHash::parse(&sample()).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", sample()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);

        let bad: Result<ContentHash, _> = serde_json::from_str("\"sha256:nope\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn any_digest_round_trips(bytes in proptest::array::uniform32(any::<u8>())) {
            let hash = ContentHash::from_digest(bytes);
            let parsed = ContentHash::parse(hash.as_str()).unwrap();
            prop_assert_eq!(parsed, hash);
        }

        #[test]
        fn strings_without_prefix_never_parse(s in "[0-9a-f]{0,80}") {
            prop_assert!(ContentHash::parse(&s).is_err());
        }
    }
}
