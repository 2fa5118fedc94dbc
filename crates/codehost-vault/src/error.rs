//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. Variants carry a
//! reason string but never the secret material that caused the failure.

/// Unified error type for key handling and secret sealing.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (e.g. wrong key, corrupted ciphertext, bad nonce).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key material could not be parsed or is too short.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_key() {
        let err = VaultError::InvalidKey {
            reason: "too short".into(),
        };
        assert_eq!(err.to_string(), "invalid key: too short");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VaultError>();
    }
}
