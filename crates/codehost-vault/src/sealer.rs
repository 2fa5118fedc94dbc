//! String sealing for secret database columns.
//!
//! A sealed value is `base64(nonce || ciphertext || tag)`, so it fits in a
//! TEXT column and carries everything needed to open it except the key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::crypto::{self, NONCE_LEN_BYTES};
use crate::error::{Result, VaultError};

/// Seals and opens UTF-8 secrets under a single master key.
#[derive(Clone)]
pub struct Sealer {
    key: Vec<u8>,
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").field("key", &"<redacted>").finish()
    }
}

impl Sealer {
    /// Build a sealer from a 256-bit master key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKey`] if `key` is not exactly
    /// [`crypto::KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != crypto::KEY_LEN {
            return Err(VaultError::InvalidKey {
                reason: format!(
                    "master key must be {} bytes, got {}",
                    crypto::KEY_LEN,
                    key.len()
                ),
            });
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Build a sealer with a random key. Sealed values do not survive the
    /// process, which is what tests and throwaway databases want.
    pub fn ephemeral() -> Result<Self> {
        Self::new(&crypto::random_bytes(crypto::KEY_LEN)?)
    }

    /// Seal `plaintext` into a base64 string.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let (nonce, ciphertext) = crypto::encrypt(plaintext.as_bytes(), &self.key)?;
        let mut out = Vec::with_capacity(NONCE_LEN_BYTES + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Open a value produced by [`Sealer::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptionFailed`] if the value is malformed,
    /// was sealed under another key, or has been tampered with.
    pub fn open(&self, sealed: &str) -> Result<String> {
        let raw = STANDARD
            .decode(sealed)
            .map_err(|e| VaultError::DecryptionFailed {
                reason: format!("sealed value is not base64: {e}"),
            })?;

        if raw.len() < NONCE_LEN_BYTES {
            return Err(VaultError::DecryptionFailed {
                reason: format!(
                    "sealed value is {} bytes, shorter than the nonce",
                    raw.len()
                ),
            });
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN_BYTES);
        let mut nonce = [0u8; NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);

        let plaintext = crypto::decrypt(&nonce, ciphertext, &self.key)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "sealed value is not UTF-8".into(),
        })
    }

    /// Seal an optional value, mapping `None` and empty strings to `None`.
    pub fn seal_opt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        match plaintext {
            Some(p) if !p.is_empty() => self.seal(p).map(Some),
            _ => Ok(None),
        }
    }

    /// Open an optional sealed value.
    pub fn open_opt(&self, sealed: Option<&str>) -> Result<Option<String>> {
        sealed.map(|s| self.open(s)).transpose()
    }
}
