use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A 32-byte BLAKE3 content digest.
///
/// Hashes double as storage keys: equal values hash to the same key, so
/// the stores deduplicate for free. Kinded hashing goes through
/// [`Hash::derive`], which uses BLAKE3's key-derivation mode so the same
/// bytes hashed under two contexts never agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero digest. Stands for "no object" where an absent key
    /// needs a concrete representation.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Plain digest of `data`, with no domain separation.
    pub fn digest(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Domain-separated digest: `context` selects a BLAKE3 key-derivation
    /// context. Contexts must be unique hardcoded strings; callers pick
    /// one per object kind so keys of different kinds cannot collide.
    pub fn derive(context: &str, data: &[u8]) -> Self {
        Self(blake3::derive_key(context, data))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex characters, for logs and human-facing output.
    pub fn abbrev(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(8);
        hex
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(TypeError::InvalidLength {
                expected: 64,
                actual: s.len(),
            });
        }
        let mut digest = [0u8; 32];
        hex::decode_to_slice(s, &mut digest)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(digest))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(digest: [u8; 32]) -> Self {
        Self(digest)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", self.abbrev())
    }
}
