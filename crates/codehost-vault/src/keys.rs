//! Parsing and generation of base64-encoded key material.
//!
//! Keys travel through configuration files and environment variables as
//! standard base64 (URL-safe input is accepted too). Anything shorter than
//! [`MIN_KEY_LEN`] bytes is rejected.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::crypto;
use crate::error::{Result, VaultError};

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = crypto::KEY_LEN;

/// Decode a base64 key, accepting both the standard and URL-safe alphabets.
///
/// # Errors
///
/// Returns [`VaultError::InvalidKey`] if the input is not base64 or decodes
/// to fewer than [`MIN_KEY_LEN`] bytes.
pub fn decode_key(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(VaultError::InvalidKey {
            reason: "key is empty".into(),
        });
    }

    let bytes = STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| VaultError::InvalidKey {
            reason: format!("not valid base64: {e}"),
        })?;

    if bytes.len() < MIN_KEY_LEN {
        return Err(VaultError::InvalidKey {
            reason: format!(
                "key must be at least {MIN_KEY_LEN} bytes, got {}",
                bytes.len()
            ),
        });
    }

    Ok(bytes)
}

/// Decode a comma-separated list of keys, preserving order.
///
/// Blank entries are skipped; at least one key must remain.
pub fn decode_key_list(encoded: &str) -> Result<Vec<Vec<u8>>> {
    let keys = encoded
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(decode_key)
        .collect::<Result<Vec<_>>>()?;

    if keys.is_empty() {
        return Err(VaultError::InvalidKey {
            reason: "key list is empty".into(),
        });
    }
    Ok(keys)
}

/// Generate a fresh random 256-bit key, base64 encoded.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn generate_key() -> Result<String> {
    let bytes = crypto::random_bytes(crypto::KEY_LEN)?;
    Ok(STANDARD.encode(bytes))
}
