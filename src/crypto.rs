//! HMAC helpers for gateway webhook authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result, msg};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of two secrets or signatures.
///
/// The length check leaks only the length, which is public for hex digests.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

/// Check a hex HMAC-SHA256 signature of `payload`. Case-insensitive on the hex.
pub fn verify_hmac_hex(secret: &[u8], payload: &[u8], signature: &str) -> Result<bool> {
    let expected = hmac_sha256_hex(secret, payload)?;
    let provided = signature.trim().to_ascii_lowercase();
    Ok(constant_time_eq(expected.as_bytes(), provided.as_bytes()))
}
