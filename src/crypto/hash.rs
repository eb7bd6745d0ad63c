// Cryptographic hashing wrapper.
//
// SHA-256 is the single canonical hash function used throughout: transaction and
// block digests, the proof-of-work construction, all of it.

use sha2::{Digest, Sha256};

pub const HASH_BYTES: usize = 32;

/// Hash an arbitrary byte buffer with SHA-256.
pub fn hash(data: &[u8]) -> [u8; HASH_BYTES] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash `a` followed by `b` without allocating a concatenation buffer.
pub fn hash_concat(a: &[u8], b: &[u8]) -> [u8; HASH_BYTES] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Lowercase two-characters-per-byte hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_length() {
        let h = hash(b"ironledger");
        assert_eq!(h.len(), 32);
    }

    #[test]
    fn test_hash_concat_matches_manual_concat() {
        let a = b"abc";
        let b = b"def";
        let mut combined = Vec::new();
        combined.extend_from_slice(a);
        combined.extend_from_slice(b);
        assert_eq!(hash_concat(a, b), hash(&combined));
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = hash(b"roundtrip");
        let s = to_hex(&h);
        assert_eq!(s.len(), 64);
        assert_eq!(from_hex(&s).unwrap(), h.to_vec());
    }
}
