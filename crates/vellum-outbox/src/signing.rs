//! Payload signing for outbound webhook calls.
//!
//! HMAC-SHA256 over the exact JSON byte sequence transmitted, hex-encoded.
//! An empty secret yields an empty signature: unsigned delivery is permitted
//! but discouraged.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix applied to generated secrets.
const SECRET_PREFIX: &str = "whsec_";

/// Compute the hex HMAC-SHA256 signature for a payload.
///
/// Returns the empty string when the secret is empty.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    if secret.is_empty() {
        return String::new();
    }

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature using constant-time comparison.
pub fn verify_signature(expected_hex: &str, secret: &str, body: &[u8]) -> bool {
    let computed = compute_signature(secret, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Generate a fresh webhook secret: `whsec_` + 32 random bytes, hex-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_deterministic() {
        let sig1 = compute_signature("s3cr3t", b"payload");
        let sig2 = compute_signature("s3cr3t", b"payload");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_signature_changes_with_body() {
        let sig1 = compute_signature("s3cr3t", b"payload");
        let sig2 = compute_signature("s3cr3t", b"payloae");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_signature_changes_with_secret() {
        let sig1 = compute_signature("secret1", b"payload");
        let sig2 = compute_signature("secret2", b"payload");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_signature_is_hex_encoded() {
        let sig = compute_signature("s3cr3t", b"payload");
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_secret_yields_empty_signature() {
        assert_eq!(compute_signature("", b"payload"), "");
    }

    #[test]
    fn test_verify_valid_signature() {
        let sig = compute_signature("s3cr3t", b"body");
        assert!(verify_signature(&sig, "s3cr3t", b"body"));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let sig = compute_signature("s3cr3t", b"body");
        assert!(!verify_signature(&sig, "s3cr3t", b"bodY"));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let sig = compute_signature("s3cr3t", b"body");
        assert!(!verify_signature(&sig, "other", b"body"));
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert!(secret.starts_with("whsec_"));
        assert_eq!(secret.len(), "whsec_".len() + 64);
        assert_ne!(generate_secret(), secret);
    }
}
