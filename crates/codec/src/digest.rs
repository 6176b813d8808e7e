//! Content identity: SHA-256 over the exact bytes received.

use sha2::{Digest as _, Sha256};

/// 32-byte SHA-256 digest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Hex-encoded lowercase string (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> Digest {
    let mut h = Sha256::new();
    h.update(bytes);
    Digest(h.finalize().into())
}

/// Lowercase-hex digest of `bytes`. This is the canonical fingerprint form;
/// comparisons elsewhere are case-sensitive, so producers must go through
/// here.
pub fn sha256_hex(bytes: &[u8]) -> String {
    sha256(bytes).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_is_lowercase_and_64_chars() {
        let h = sha256_hex(b"anything");
        assert_eq!(h.len(), 64);
        assert_eq!(h, h.to_lowercase());
    }
}
