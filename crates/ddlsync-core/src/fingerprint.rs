//! DDL content fingerprints

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters (128 bits)
pub const FINGERPRINT_LEN: usize = 32;

/// Stable content hash of a DDL text
///
/// The first 128 bits of SHA-256, lowercase hex. The text is hashed
/// byte-for-byte; whitespace differences count as changes.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}
