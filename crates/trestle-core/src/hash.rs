//! Deterministic content hashing for RDF terms and statements using blake3.
//!
//! Every hashable entity produces a [`Fingerprint`]: the full 256-bit blake3
//! digest of a canonical byte encoding. The fast-path 32-bit content hash
//! used by identifier caches and persisted alongside rows is derived from the
//! first four bytes of the fingerprint, so it is cheap to compute but not
//! unique.
//!
//! # Canonical encoding
//!
//! Each field is written as a one-byte tag followed by a little-endian `u64`
//! length and the raw UTF-8 bytes. Length prefixes keep `("ab", "c")` and
//! `("a", "bc")` apart; tags keep a datatype from being confused with a
//! language tag of the same text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Full-width content digest of a node, triple or URI.
///
/// Two entities with equal fingerprints are treated as the same entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Fingerprint(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The 32-bit fast-path hash: the first four digest bytes, little endian.
    pub fn content_hash(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Fingerprint(*hash.as_bytes())
    }
}

/// Incremental builder for canonical fingerprints.
pub(crate) struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    pub(crate) fn new(domain: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        FingerprintBuilder { hasher }
    }

    /// Appends a tagged, length-prefixed text field.
    pub(crate) fn field(&mut self, tag: u8, text: &str) -> &mut Self {
        self.hasher.update(&[tag]);
        self.hasher.update(&(text.len() as u64).to_le_bytes());
        self.hasher.update(text.as_bytes());
        self
    }

    /// Appends a nested fingerprint.
    pub(crate) fn nested(&mut self, fingerprint: &Fingerprint) -> &mut Self {
        self.hasher.update(fingerprint.as_bytes());
        self
    }

    pub(crate) fn finish(&self) -> Fingerprint {
        Fingerprint::from(self.hasher.finalize())
    }
}

/// Fingerprint of a bare string (graph URIs, namespace URIs).
pub fn fingerprint_str(text: &str) -> Fingerprint {
    FingerprintBuilder::new(b"str").field(0, text).finish()
}

/// 32-bit content hash of a bare string.
pub fn hash_str(text: &str) -> u32 {
    fingerprint_str(text).content_hash()
}
