//! Random nonces for request/response correlation.

use rand::Rng;

/// Nonce length in bytes (produces 32 hex characters).
const NONCE_BYTES: usize = 16;

/// Generates a random nonce as a 32-character lowercase hex string.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
