//! Credential-at-rest encryption for `ProviderConfig` entries (§3, §9).
//!
//! AES-256-GCM with a random 12-byte nonce prepended to the ciphertext.
//! Decrypted key material is returned by value with a scope the caller must
//! keep to the single LLM call that needs it; it is never logged or cached
//! (§4.4, §9).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid encryption key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
    #[error("decryption failed: ciphertext may be tampered or the key is wrong")]
    DecryptionFailed,
    #[error("invalid base64 ciphertext: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Encrypts and decrypts `ProviderConfig` credential material.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(key).expect("length checked above");
        Ok(Self { cipher })
    }

    /// Encrypt plaintext, returning base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut combined = Vec::with_capacity(12 + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a base64(nonce || ciphertext) string produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let combined = BASE64.decode(encoded)?;
        if combined.len() < 12 {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn decrypt_to_string(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = self.decrypt(encoded)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_key_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let c = cipher();
        let ciphertext = c.encrypt(b"sk-live-some-api-key").unwrap();
        let plaintext = c.decrypt_to_string(&ciphertext).unwrap();
        assert_eq!(plaintext, "sk-live-some-api-key");
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let c = cipher();
        let ciphertext = c.encrypt(b"").unwrap();
        assert_eq!(c.decrypt(&ciphertext).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let c1 = cipher();
        let c2 = CredentialCipher::from_key_bytes(&[9u8; 32]).unwrap();
        let ciphertext = c1.encrypt(b"secret").unwrap();
        assert!(c2.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(matches!(
            CredentialCipher::from_key_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn too_short_ciphertext_rejected() {
        let c = cipher();
        let short = BASE64.encode([1, 2, 3]);
        assert!(matches!(c.decrypt(&short), Err(CryptoError::CiphertextTooShort)));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let c = cipher();
        let encoded = c.encrypt(b"secret-value").unwrap();
        let mut raw = BASE64.decode(&encoded).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = BASE64.encode(raw);
        assert!(c.decrypt(&tampered).is_err());
    }

    #[test]
    fn distinct_nonce_each_call() {
        let c = cipher();
        let a = c.encrypt(b"same-plaintext").unwrap();
        let b = c.encrypt(b"same-plaintext").unwrap();
        assert_ne!(a, b);
    }
}
