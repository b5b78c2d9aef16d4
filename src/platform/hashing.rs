use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Content hash the platform uses to address uploaded files:
/// base64 of the SHA-256 digest.
pub fn get_bytes_hash(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}
