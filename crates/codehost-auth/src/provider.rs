//! Provider adapter contract and registry.
//!
//! An adapter knows two things about one kind of code host: how to build the
//! URL that asks a user for consent, and how to trade the returned
//! authorization code for tokens. The orchestrator only talks to this trait;
//! new providers are added by implementing it and registering the adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codehost_store::{ProviderKind, TokenGrant};
use url::Url;

use crate::error::Result;
use crate::oauth::OAuthProvider;

/// Inputs for a code exchange, taken from the code host record.
#[derive(Clone)]
pub struct ExchangeRequest {
    /// Base address of the provider instance.
    pub base_address: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Authorization code from the callback.
    pub code: String,
    /// The callback URL that was sent with the authorization request.
    pub callback_uri: String,
}

impl std::fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("base_address", &self.base_address)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("code", &"<redacted>")
            .field("callback_uri", &self.callback_uri)
            .finish()
    }
}

/// Capability set every provider kind must implement.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider kind this adapter serves.
    fn kind(&self) -> ProviderKind;

    /// Assemble the provider's authorization endpoint URL.
    ///
    /// Pure: no I/O, same inputs give the same URL.
    fn authorization_url(
        &self,
        base_address: &str,
        client_id: &str,
        state: &str,
        callback_uri: &str,
    ) -> Result<Url>;

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// [`AuthError::ProviderRejected`](crate::AuthError::ProviderRejected)
    /// when the provider answers with a failure,
    /// [`AuthError::NetworkFailure`](crate::AuthError::NetworkFailure) on
    /// transport errors.
    async fn exchange_code(&self, request: &ExchangeRequest) -> Result<TokenGrant>;
}

/// Adapters keyed by provider kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in OAuth adapters (github, gitlab, gitee).
    ///
    /// `exchange_timeout` bounds each token request.
    pub fn with_defaults(exchange_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for kind in [ProviderKind::GitHub, ProviderKind::GitLab, ProviderKind::Gitee] {
            registry.register(Arc::new(OAuthProvider::new(kind, exchange_timeout)?));
        }
        Ok(registry)
    }

    /// Register `adapter` for its kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let kind = adapter.kind();
        if self.adapters.insert(kind, adapter).is_some() {
            tracing::debug!(kind = %kind, "replaced provider adapter");
        }
    }

    /// Look up the adapter for `kind`.
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.adapters.contains_key(k))
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_oauth_kinds_only() {
        let registry = ProviderRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        assert_eq!(
            registry.kinds(),
            vec![ProviderKind::GitHub, ProviderKind::GitLab, ProviderKind::Gitee]
        );
        assert!(registry.get(ProviderKind::Gerrit).is_none());
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(
            OAuthProvider::new(ProviderKind::GitLab, Duration::from_secs(1)).unwrap(),
        ));
        registry.register(Arc::new(
            OAuthProvider::new(ProviderKind::GitLab, Duration::from_secs(2)).unwrap(),
        ));
        assert_eq!(registry.kinds(), vec![ProviderKind::GitLab]);
    }

    #[test]
    fn exchange_request_debug_redacts() {
        let request = ExchangeRequest {
            base_address: "https://git.example.com".into(),
            client_id: "abc".into(),
            client_secret: Some("topsecret".into()),
            code: "authcode".into(),
            callback_uri: "https://ci/callback".into(),
        };
        let out = format!("{request:?}");
        assert!(!out.contains("topsecret"));
        assert!(!out.contains("authcode"));
        assert!(out.contains("abc"));
    }
}
