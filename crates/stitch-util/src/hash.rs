//! Digests of emitted artifacts.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_hex_and_content_sensitive() {
        let class = sha256_bytes(b"\xCA\xFE\xBA\xBE\x00\x00\x00\x34");
        assert_eq!(class.len(), 64);
        assert!(class.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(class, sha256_bytes(b"\xCA\xFE\xBA\xBE\x00\x00\x00\x35"));
    }
}
