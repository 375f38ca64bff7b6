//! At-rest encryption for messaging API access tokens.
//!
//! AES-256-GCM with a key derived as SHA-256 of a configured passphrase.
//! Stored form is `nonce (12 bytes) || ciphertext+tag`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

impl CredentialCipher {
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CoreError> {
        if passphrase.is_empty() {
            return Err(CoreError::Internal(
                "Credential encryption passphrase must not be empty".to_string(),
            ));
        }
        let key = Sha256::digest(passphrase.as_bytes());
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Internal("Failed to encrypt credential".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, stored: &[u8]) -> Result<String, CoreError> {
        if stored.len() <= NONCE_LEN {
            return Err(CoreError::Internal("Stored credential is truncated".to_string()));
        }
        let (nonce, ciphertext) = stored.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Internal("Failed to decrypt credential".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Internal("Decrypted credential is not UTF-8".to_string()))
    }
}
