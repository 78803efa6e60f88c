use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercase hex MD5 digest of a file's UTF-8 text.
///
/// Two files with the same `ContentHash` are assumed to have identical
/// content. The hash is the semantic identity of a file throughout the
/// driver: unlinked summaries, dependency signatures, and cached error
/// tables are all keyed by it, directly or transitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Computes the hash of a file's text.
    pub fn new(text: &str) -> Self {
        Self(hex_digest([text.as_bytes()]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digests an ordered sequence of byte strings into lowercase hex.
///
/// Callers that need order-independence must sort before digesting.
pub(crate) fn hex_digest<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::new("class A {}");
        let b = ContentHash::new("class A {}");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_differs() {
        let a = ContentHash::new("class A {}");
        let b = ContentHash::new("class B {}");
        assert_ne!(a, b);
    }

    #[test]
    fn lowercase_hex_of_md5_width() {
        let h = ContentHash::new("hello");
        assert_eq!(h.as_str().len(), 32);
        assert!(h
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_content_hashes() {
        // Missing files coerce to empty content, so the empty hash is load-bearing.
        assert_eq!(ContentHash::new("").as_str().len(), 32);
    }

    #[test]
    fn digest_is_order_sensitive() {
        let ab = hex_digest([b"a".as_slice(), b"b".as_slice()]);
        let ba = hex_digest([b"b".as_slice(), b"a".as_slice()]);
        assert_ne!(ab, ba);
    }
}
