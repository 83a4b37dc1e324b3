//! Stable content hashing for cache keys and replay digests.

use blake3::Hasher;
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// Two-character shard directory used to keep segment folders small.
    pub fn shard(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 || !s.is_ascii() {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            out[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Hash256(out))
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, Error> {
    let bytes = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Hash a serializable value together with labelled extra parts.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn hash_with<T: Serialize>(v: &T, parts: &[(&str, &str)]) -> Result<Hash256, Error> {
    let body = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
    let mut h = Hasher::new();
    h.update(&(body.len() as u64).to_le_bytes());
    h.update(&body);
    for (label, value) in parts {
        for piece in [label.as_bytes(), value.as_bytes()] {
            h.update(&(piece.len() as u64).to_le_bytes());
            h.update(piece);
        }
    }
    Ok(Hash256(h.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_and_shard() {
        let h = hash_str("hello");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Hash256::from_hex(&hex), Some(h));
        assert_eq!(h.shard(), hex[..2]);
        assert_eq!(Hash256::from_hex("zz"), None);
    }

    #[test]
    fn parts_are_length_prefixed() {
        let a = hash_with(&1u8, &[("p", "ab"), ("q", "c")]).unwrap();
        let b = hash_with(&1u8, &[("p", "a"), ("q", "bc")]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, hash_with(&1u8, &[("p", "ab"), ("q", "c")]).unwrap());
    }
}
