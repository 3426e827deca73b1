//! Encryption of third-party access tokens at rest
//!
//! GitHub access tokens are encrypted with AES-256-GCM before they are
//! persisted. Ciphertext, nonce, and authentication tag are stored as
//! three independent hex columns.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::AppError;

/// GCM nonce length in bytes
const IV_LENGTH: usize = 12;
/// GCM authentication tag length in bytes
const TAG_LENGTH: usize = 16;

/// Encrypted token triple, each part hex-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// AES-256-GCM cipher with a process-wide key.
///
/// The key is provisioned out-of-band through configuration and is
/// never logged or returned to a client.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Create a cipher from a hex-encoded 32-byte key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, AppError> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| AppError::Config(format!("auth.encryption_key is not valid hex: {e}")))?;
        if key_bytes.len() != 32 {
            return Err(AppError::Config(
                "auth.encryption_key must decode to 32 bytes".to_string(),
            ));
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a plaintext token.
    ///
    /// A fresh random 96-bit nonce is generated per call; a nonce is
    /// never reused for this key.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedToken, AppError> {
        let mut iv = [0_u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        // aes-gcm appends the tag to the ciphertext; split it off so the
        // three parts persist independently.
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Encryption("token encryption failed".to_string()))?;
        let tag = sealed.split_off(sealed.len() - TAG_LENGTH);

        Ok(EncryptedToken {
            ciphertext: hex::encode(sealed),
            iv: hex::encode(iv),
            tag: hex::encode(tag),
        })
    }

    /// Decrypt a stored token triple.
    ///
    /// # Errors
    /// Fails with an encryption error if any part is malformed hex or
    /// the authentication tag does not verify.
    pub fn decrypt(&self, ciphertext: &str, iv: &str, tag: &str) -> Result<String, AppError> {
        let mut sealed = hex::decode(ciphertext)
            .map_err(|_| AppError::Encryption("malformed ciphertext".to_string()))?;
        let iv_bytes =
            hex::decode(iv).map_err(|_| AppError::Encryption("malformed iv".to_string()))?;
        let tag_bytes =
            hex::decode(tag).map_err(|_| AppError::Encryption("malformed auth tag".to_string()))?;

        if iv_bytes.len() != IV_LENGTH || tag_bytes.len() != TAG_LENGTH {
            return Err(AppError::Encryption(
                "invalid iv or auth tag length".to_string(),
            ));
        }

        sealed.extend_from_slice(&tag_bytes);
        let nonce = Nonce::from_slice(&iv_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| AppError::Encryption("token authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::Encryption("decrypted token is not UTF-8".to_string()))
    }
}
