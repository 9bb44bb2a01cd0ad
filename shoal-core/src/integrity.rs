//! Integrity: content digest computed by the hosting peer, verified by the downloader.
//! The framing layer carries no checksum of its own; file payloads carry this one.

use sha2::{Digest, Sha256};

/// Digest file content. Returns the 32-byte SHA-256.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Verify downloaded content against the digest declared by the sender.
pub fn verify(bytes: &[u8], expected: &[u8; 32]) -> bool {
    digest(bytes) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_verify_roundtrip() {
        let content = b"hosted file content";
        let d = digest(content);
        assert!(verify(content, &d));
    }

    #[test]
    fn verify_rejects_tampered() {
        let d = digest(b"hosted file content");
        assert!(!verify(b"tampered", &d));
    }
}
