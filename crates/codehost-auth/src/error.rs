//! Error types for the auth crate.
//!
//! Every handshake failure surfaces through [`AuthError`]. Variants map onto
//! the outcomes a caller has to distinguish: bad input, missing record, no
//! adapter, state token verification failures, provider outcomes, and the
//! infrastructure failures underneath.

use codehost_store::{ProviderKind, StoreError};

/// Unified error type for the authorization handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input, e.g. a redirect URI that is not absolute.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
    },

    /// The code host does not exist (or was deleted mid-handshake).
    #[error("code host not found: {id}")]
    NotFound {
        /// The code host id that was looked up.
        id: i64,
    },

    /// No adapter is registered for the record's provider kind.
    #[error("no provider adapter registered for {kind}")]
    UnsupportedProvider {
        /// The provider kind without an adapter.
        kind: ProviderKind,
    },

    /// The state token is malformed or its tag does not verify.
    #[error("invalid state token: {reason}")]
    InvalidState {
        /// Why verification failed.
        reason: String,
    },

    /// The state token verified but its validity window has elapsed.
    #[error("state token expired {age_secs}s after issuance")]
    ExpiredState {
        /// Seconds since issuance at the time of the check.
        age_secs: i64,
    },

    /// The state token was already used to complete a handshake.
    #[error("state token already consumed")]
    ReplayedState,

    /// The user declined the authorization at the provider.
    #[error("authorization denied by provider: {reason}")]
    AuthorizationDenied {
        /// The provider's `error` (and description, when given).
        reason: String,
    },

    /// The provider's token endpoint refused the code exchange.
    #[error("provider rejected code exchange: {reason}")]
    ProviderRejected {
        /// Explanation from the provider.
        reason: String,
    },

    /// Transport-level failure talking to the provider.
    #[error("network failure talking to provider: {reason}")]
    NetworkFailure {
        /// The underlying transport error.
        reason: String,
    },

    /// The credential store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A credential store call did not finish in time.
    #[error("credential store unavailable: {reason}")]
    StoreUnavailable {
        /// Which operation timed out.
        reason: String,
    },

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl AuthError {
    /// Stable snake_case identifier, used in callback redirects and JSON
    /// error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::NotFound { .. } => "not_found",
            Self::UnsupportedProvider { .. } => "unsupported_provider",
            Self::InvalidState { .. } => "invalid_state",
            Self::ExpiredState { .. } => "expired_state",
            Self::ReplayedState => "replayed_state",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::NetworkFailure { .. } => "network_failure",
            Self::Store(_) => "store_error",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// Only transport failures during code exchange are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    /// Returns `true` for the three state token verification failures.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::ExpiredState { .. } | Self::ReplayedState
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkFailure {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
