//! SHA-256 payload checksums
//!
//! Every frame stores the digest of its payload; every read recomputes it.

use sha2::{Digest, Sha256};

/// Digest length in bytes
pub const CHECKSUM_LEN: usize = 32;

/// Computes the SHA-256 digest of `data`.
pub fn compute_checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Verifies that `data` hashes to `expected`.
pub fn verify_checksum(data: &[u8], expected: &[u8]) -> bool {
    compute_checksum(data).as_slice() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("hello")
        let digest = compute_checksum(b"hello");
        assert_eq!(digest[0], 0x2c);
        assert_eq!(digest[1], 0xf2);
        assert_eq!(digest[31], 0x24);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        let original = compute_checksum(&data);
        data[2] ^= 0x01;
        assert!(!verify_checksum(&data, &original));
    }

    #[test]
    fn test_empty_payload_has_digest() {
        let digest = compute_checksum(b"");
        assert!(verify_checksum(b"", &digest));
        assert_eq!(digest[0], 0xe3);
    }
}
