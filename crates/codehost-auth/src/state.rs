//! Signed, URL-safe state tokens.
//!
//! A state token threads the handshake's context (target code host, the
//! caller's redirect URI, issuance time) through the provider round trip
//! without any server-side session. Format:
//!
//! ```text
//! base64url(json claims) "." base64url(HMAC-SHA256(claims segment))
//! ```
//!
//! The first [`SigningKeys`] entry signs; every entry verifies, so keys can
//! be rotated by prepending a new one and dropping the oldest later.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};

use codehost_vault::keys;

use crate::error::{AuthError, Result};

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// The context bound into a state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    /// Target code host.
    #[serde(rename = "cid")]
    pub code_host_id: i64,

    /// Where the caller wants the browser to end up afterwards.
    #[serde(rename = "ru")]
    pub redirect_uri: String,

    /// Unix timestamp (seconds) of issuance.
    #[serde(rename = "iat")]
    pub issued_at: i64,

    /// Random per-issuance value; two initiations never share a token.
    #[serde(rename = "n")]
    pub nonce: String,
}

impl StateClaims {
    /// Claims for a new handshake issued now.
    pub fn issue(code_host_id: i64, redirect_uri: impl Into<String>) -> Self {
        Self::issued_at(code_host_id, redirect_uri, Utc::now().timestamp())
    }

    /// Claims with an explicit issuance time.
    pub fn issued_at(code_host_id: i64, redirect_uri: impl Into<String>, issued_at: i64) -> Self {
        Self {
            code_host_id,
            redirect_uri: redirect_uri.into(),
            issued_at,
            nonce: uuid::Uuid::now_v7().simple().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Ordered, non-empty set of HMAC-SHA256 keys.
#[derive(Clone)]
pub struct SigningKeys {
    keys: Vec<hmac::Key>,
}

impl SigningKeys {
    /// Build from raw key bytes, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the list is empty or any key
    /// is shorter than [`keys::MIN_KEY_LEN`] bytes.
    pub fn new(raw: Vec<Vec<u8>>) -> Result<Self> {
        if raw.is_empty() {
            return Err(AuthError::InvalidConfig {
                reason: "at least one signing key is required".into(),
            });
        }
        if let Some(short) = raw.iter().find(|k| k.len() < keys::MIN_KEY_LEN) {
            return Err(AuthError::InvalidConfig {
                reason: format!(
                    "signing keys must be at least {} bytes, got {}",
                    keys::MIN_KEY_LEN,
                    short.len()
                ),
            });
        }

        Ok(Self {
            keys: raw
                .iter()
                .map(|k| hmac::Key::new(hmac::HMAC_SHA256, k))
                .collect(),
        })
    }

    /// Parse a comma-separated list of base64 keys.
    pub fn from_base64_list(encoded: &str) -> Result<Self> {
        let raw = keys::decode_key_list(encoded).map_err(|e| AuthError::InvalidConfig {
            reason: format!("signing keys: {e}"),
        })?;
        Self::new(raw)
    }

    /// A single random key, valid for this process only.
    pub fn ephemeral() -> Result<Self> {
        let key = codehost_vault::crypto::random_bytes(keys::MIN_KEY_LEN).map_err(|e| {
            AuthError::InvalidConfig {
                reason: format!("failed to generate signing key: {e}"),
            }
        })?;
        Self::new(vec![key])
    }

    /// Number of keys accepted for verification.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn signing_key(&self) -> &hmac::Key {
        // Non-empty by construction.
        &self.keys[0]
    }
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("count", &self.keys.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// A state token that passed tag and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedState {
    pub claims: StateClaims,
    /// Hex SHA-256 of the integrity tag; the replay-tracking key.
    pub fingerprint: String,
    /// Unix timestamp after which the token is expired regardless of replay.
    pub expires_at: i64,
}

/// Encodes and verifies state tokens.
#[derive(Debug, Clone)]
pub struct StateTokenCodec {
    keys: SigningKeys,
    ttl_secs: i64,
    skew_secs: i64,
}

impl StateTokenCodec {
    pub fn new(keys: SigningKeys, ttl: std::time::Duration, clock_skew: std::time::Duration) -> Self {
        Self {
            keys,
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            skew_secs: i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Encode `claims` into a URL-safe token signed with the newest key.
    ///
    /// Deterministic for a given key and claims.
    pub fn encode(&self, claims: &StateClaims) -> Result<String> {
        let json = serde_json::to_vec(claims).map_err(|e| AuthError::InvalidRequest {
            reason: format!("failed to serialise state claims: {e}"),
        })?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let tag = hmac::sign(self.keys.signing_key(), body.as_bytes());
        Ok(format!("{body}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Verify `token` against the current time.
    pub fn decode(&self, token: &str) -> Result<VerifiedState> {
        self.decode_at(token, Utc::now().timestamp())
    }

    /// Verify `token` as if the current time were `now`.
    ///
    /// The tag is checked before anything inside the claims is trusted, so
    /// a tampered token is always [`AuthError::InvalidState`] and only an
    /// authentic token can be [`AuthError::ExpiredState`].
    pub fn decode_at(&self, token: &str, now: i64) -> Result<VerifiedState> {
        let (claims, tag) = self.authenticate(token)?;

        if claims.issued_at - now > self.skew_secs {
            return Err(invalid("issued in the future"));
        }
        let age_secs = now - claims.issued_at;
        if age_secs > self.ttl_secs {
            return Err(AuthError::ExpiredState { age_secs });
        }

        Ok(VerifiedState {
            expires_at: claims.issued_at.saturating_add(self.ttl_secs),
            fingerprint: fingerprint(&tag),
            claims,
        })
    }

    /// Claims of a token whose tag verifies, ignoring its age.
    ///
    /// Lets a caller route a stale or already-used token back to where it
    /// came from. Never use this to accept a token.
    pub fn authentic_claims(&self, token: &str) -> Option<StateClaims> {
        self.authenticate(token).ok().map(|(claims, _)| claims)
    }

    /// Check the tag, then parse the claims it covers.
    fn authenticate(&self, token: &str) -> Result<(StateClaims, Vec<u8>)> {
        let (body, tag_b64) = token.split_once('.').ok_or_else(|| invalid("missing tag"))?;
        if body.is_empty() || tag_b64.is_empty() {
            return Err(invalid("empty segment"));
        }

        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| invalid("tag is not base64url"))?;

        let verified = self
            .keys
            .keys
            .iter()
            .any(|key| hmac::verify(key, body.as_bytes(), &tag).is_ok());
        if !verified {
            return Err(invalid("tag does not verify"));
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| invalid("claims are not base64url"))?;
        let claims: StateClaims =
            serde_json::from_slice(&json).map_err(|_| invalid("claims are malformed"))?;
        Ok((claims, tag))
    }
}

fn invalid(reason: &str) -> AuthError {
    AuthError::InvalidState {
        reason: reason.to_string(),
    }
}

/// Hex SHA-256 of an integrity tag.
fn fingerprint(tag: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, tag);
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
