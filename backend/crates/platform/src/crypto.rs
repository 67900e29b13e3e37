//! Cryptographic Utilities

use base64::{Engine, engine::general_purpose};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// Generate cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate `len` random bytes encoded as URL-safe Base64 without padding
pub fn random_token(len: usize) -> String {
    to_base64_url(&random_bytes(len))
}

/// Compute SHA-512 hash
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-512 and encode it as lowercase hex (128 chars)
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(sha512(data))
}

/// Encode bytes as URL-safe base64 (no padding)
pub fn to_base64_url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe base64 (no padding) to bytes
pub fn from_base64_url(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Constant-time comparison to prevent timing attacks
///
/// Length is not secret: slices of different lengths compare unequal
/// immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
