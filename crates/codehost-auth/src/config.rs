//! Handshake configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

/// Default validity window of a state token (10 minutes).
pub const DEFAULT_STATE_TTL_SECS: u64 = 600;

/// Default timeout for a single code exchange request.
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 10;

/// Tunables for the authorization handshake.
///
/// Durations are kept as integer fields so the struct maps directly onto the
/// `[auth]` section of the configuration file; use the accessor methods to
/// get [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Externally reachable callback route registered with every provider.
    pub callback_url: String,

    /// Where the browser goes when a failed callback carries no decodable
    /// redirect URI.
    pub default_redirect: String,

    /// How long an issued state token stays valid.
    pub state_ttl_secs: u64,

    /// Timeout for one token exchange request.
    pub exchange_timeout_secs: u64,

    /// Extra attempts after a network failure during code exchange.
    pub exchange_retries: u32,

    /// Backoff unit between exchange attempts; attempt `n` waits `n` units.
    pub retry_backoff_ms: u64,

    /// Timeout for each credential store call.
    pub store_timeout_secs: u64,

    /// Tolerance for tokens whose issuance time lies in the future.
    pub clock_skew_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            callback_url: "http://127.0.0.1:8080/api/codehosts/callback".to_string(),
            default_redirect: "http://127.0.0.1:8080/".to_string(),
            state_ttl_secs: DEFAULT_STATE_TTL_SECS,
            exchange_timeout_secs: DEFAULT_EXCHANGE_TIMEOUT_SECS,
            exchange_retries: 2,
            retry_backoff_ms: 250,
            store_timeout_secs: 5,
            clock_skew_secs: 60,
        }
    }
}

impl AuthConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Check that URLs are absolute and windows are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("callback_url", &self.callback_url),
            ("default_redirect", &self.default_redirect),
        ] {
            let url = Url::parse(value).map_err(|e| AuthError::InvalidConfig {
                reason: format!("{name} is not an absolute URL ({value:?}): {e}"),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AuthError::InvalidConfig {
                    reason: format!("{name} must use http or https: {value}"),
                });
            }
        }

        if self.state_ttl_secs == 0 {
            return Err(AuthError::InvalidConfig {
                reason: "state_ttl_secs must be greater than zero".into(),
            });
        }
        if self.exchange_timeout_secs == 0 || self.store_timeout_secs == 0 {
            return Err(AuthError::InvalidConfig {
                reason: "timeouts must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AuthConfig::default();
        config.validate().unwrap();
        assert_eq!(config.state_ttl(), Duration::from_secs(600));
        assert_eq!(config.exchange_timeout(), Duration::from_secs(10));
        assert_eq!(config.exchange_retries, 2);
    }

    #[test]
    fn relative_callback_is_rejected() {
        let config = AuthConfig {
            callback_url: "/api/codehosts/callback".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = AuthConfig {
            state_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AuthConfig = serde_json::from_str(r#"{"state_ttl_secs": 120}"#).unwrap();
        assert_eq!(config.state_ttl_secs, 120);
        assert_eq!(config.exchange_retries, 2);
    }
}
