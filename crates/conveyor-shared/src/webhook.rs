//! HMAC signing/verification for worker-to-gateway webhooks (§6.3).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{ConveyorError, ConveyorResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-conveyor-signature";

/// Sign a webhook body with the shared HMAC secret, returning a hex digest
/// suitable for the `x-conveyor-signature` header.
pub fn sign(secret: &str, body: &[u8]) -> ConveyorResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ConveyorError::Webhook(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes().as_slice()))
}

/// Verify a received signature in constant time via `hmac`'s built-in
/// comparison, rather than comparing hex strings directly.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> ConveyorResult<bool> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ConveyorError::Webhook(e.to_string()))?;
    mac.update(body);
    let expected = hex::decode(signature_hex).map_err(|e| ConveyorError::Webhook(e.to_string()))?;
    Ok(mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let sig = sign("secret", b"payload").unwrap();
        assert!(verify("secret", b"payload", &sig).unwrap());
    }

    #[test]
    fn verify_fails_for_wrong_secret() {
        let sig = sign("secret", b"payload").unwrap();
        assert!(!verify("other-secret", b"payload", &sig).unwrap());
    }

    #[test]
    fn verify_fails_for_tampered_body() {
        let sig = sign("secret", b"payload").unwrap();
        assert!(!verify("secret", b"tampered", &sig).unwrap());
    }
}
