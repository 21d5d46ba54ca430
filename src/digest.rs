use sha2::{Digest, Sha256};

/// key: audit-fingerprint -> request side
/// Hex SHA-256 of the raw ciphertext bytes. Returned to the caller and stored in the audit log.
pub fn request_fingerprint(ciphertext: &[u8]) -> String {
    hex::encode(Sha256::digest(ciphertext))
}

/// key: audit-fingerprint -> response side
/// Hex SHA-256 applied twice over the recovered plaintext, so the stored value
/// cannot be matched against a single-pass digest of the key material.
pub fn response_fingerprint(plaintext: &[u8]) -> String {
    let first = Sha256::digest(plaintext);
    hex::encode(Sha256::digest(first))
}
