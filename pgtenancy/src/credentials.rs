//! Tenant role credentials
//!
//! Passwords are generated once, handed to the caller in plaintext, and
//! stored only as `base64(nonce || ciphertext || tag)` under AES-256-GCM.

use crate::error::{Result, TenancyError};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pgtenancy_config::TenancyConfig;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated role passwords
pub const PASSWORD_LEN: usize = 32;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Generate a random alphanumeric role password.
///
/// The alphabet needs no escaping inside a SQL string literal, though
/// statements still quote it.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Symmetric cipher for stored role passwords
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl CredentialCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a base64 key, with or without a `base64:` prefix
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let encoded = encoded.strip_prefix("base64:").unwrap_or(encoded);

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| TenancyError::configuration("key", format!("not valid base64: {e}")))?;

        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            TenancyError::configuration(
                "key",
                format!("must decode to {KEY_LEN} bytes, got {}", b.len()),
            )
        })?;

        Ok(Self::new(key))
    }

    /// Build from the configured `key`
    pub fn from_config(config: &TenancyConfig) -> Result<Self> {
        match config.key.as_deref() {
            Some(key) if !key.trim().is_empty() => Self::from_base64(key),
            _ => Err(TenancyError::configuration("key", "is not configured")),
        }
    }

    /// Fresh random key, base64 encoded with the `base64:` prefix
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        format!("base64:{}", STANDARD.encode(key))
    }

    /// Encrypt a plaintext password. Every call uses a fresh nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| TenancyError::Credential("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a stored password; fails on malformed input or a wrong key
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TenancyError::Credential(format!("base64 decode: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(TenancyError::Credential("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
            TenancyError::Credential("decryption failed: wrong key or corrupted data".to_string())
        })?;

        String::from_utf8(plaintext)
            .map_err(|_| TenancyError::Credential("decrypted value is not UTF-8".to_string()))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(***)")
    }
}
