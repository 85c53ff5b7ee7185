// HMAC signing for session cookies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
#[error("HMAC init failed: {0}")]
pub struct SignatureError(String);

/// HMAC-SHA256 of `value` under `secret`, base64url without padding.
pub fn make_signature(value: &str, secret: &str) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError(e.to_string()))?;
    mac.update(value.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(value: &str, secret: &str, signature: &str) -> bool {
    make_signature(value, secret)
        .map(|expected| constant_time_equal(expected.as_bytes(), signature.as_bytes()))
        .unwrap_or(false)
}

/// Compare two byte slices in constant time.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let sig = make_signature("session-1", "secret-secret-secret").unwrap();
        assert!(verify_signature("session-1", "secret-secret-secret", &sig));
        assert!(!verify_signature("session-2", "secret-secret-secret", &sig));
        assert!(!verify_signature("session-1", "other-secret-value", &sig));
    }

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal(b"abc", b"abc"));
        assert!(!constant_time_equal(b"abc", b"abd"));
        assert!(!constant_time_equal(b"abc", b"ab"));
    }
}
