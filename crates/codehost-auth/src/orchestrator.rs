//! The two-phase authorization handshake.
//!
//! [`AuthorizationOrchestrator::initiate`] turns `(code host, redirect URI)`
//! into a provider consent URL carrying a signed state token.
//! [`AuthorizationOrchestrator::complete`] verifies the token that comes
//! back on the callback, consumes it, trades the authorization code for
//! tokens and stores them on the record.
//!
//! ```text
//! Issued ──complete──▶ Consumed
//!    │                  (success, denial, exchange failure)
//!    ├── window elapsed ──▶ Expired
//!    └── tag mismatch   ──▶ Invalid
//! ```
//!
//! No handshake state is kept between the two calls; any instance holding
//! the signing keys can complete a handshake another instance initiated.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use codehost_store::{CodeHost, TokenGrant};

use crate::config::AuthConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, Result};
use crate::provider::{ExchangeRequest, ProviderAdapter, ProviderRegistry};
use crate::replay::ReplayGuard;
use crate::state::{StateClaims, StateTokenCodec, VerifiedState};

// ---------------------------------------------------------------------------
// Callback types
// ---------------------------------------------------------------------------

/// Query parameters a provider sends to the callback route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A handshake that stored fresh tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedHandshake {
    pub code_host_id: i64,
    /// The redirect URI supplied at initiation, unchanged.
    pub redirect_uri: String,
}

/// A failed completion, still carrying a place to send the browser.
#[derive(Debug, thiserror::Error)]
#[error("authorization handshake failed: {error}")]
pub struct HandshakeFailure {
    #[source]
    pub error: AuthError,
    /// Decoded redirect URI, or the configured default when the state token
    /// could not be trusted.
    pub redirect_uri: String,
    /// Code host the failed handshake targeted, when known.
    pub code_host_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives initiate and complete against the store, codec and adapters.
#[derive(Clone)]
pub struct AuthorizationOrchestrator {
    store: Arc<dyn CredentialStore>,
    providers: ProviderRegistry,
    codec: StateTokenCodec,
    replay: Arc<dyn ReplayGuard>,
    config: AuthConfig,
}

impl AuthorizationOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        providers: ProviderRegistry,
        codec: StateTokenCodec,
        replay: Arc<dyn ReplayGuard>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            providers,
            codec,
            replay,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the provider consent URL for `code_host_id`.
    ///
    /// Reads the record, never writes it.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidRequest`] for a redirect URI that is not an
    /// absolute http(s) URL or a record without a client id,
    /// [`AuthError::NotFound`] for an unknown id,
    /// [`AuthError::UnsupportedProvider`] when no adapter serves the kind.
    #[instrument(skip(self, redirect_uri))]
    pub async fn initiate(&self, code_host_id: i64, redirect_uri: &str) -> Result<Url> {
        let (host, adapter) = self.prepare(code_host_id, redirect_uri, None).await?;

        let claims = StateClaims::issue(code_host_id, redirect_uri);
        let token = self.codec.encode(&claims)?;
        let url = adapter.authorization_url(
            &host.address,
            &host.client_id,
            &token,
            &self.config.callback_url,
        )?;

        info!(code_host_id, kind = %host.kind, "authorization initiated");
        Ok(url)
    }

    /// Run every check [`initiate`](Self::initiate) runs, without issuing a
    /// token.
    ///
    /// `client_id` stands in for the stored client id, so a caller about to
    /// replace it can validate the request before writing anything.
    ///
    /// # Errors
    ///
    /// The same errors as [`initiate`](Self::initiate).
    pub async fn preflight(
        &self,
        code_host_id: i64,
        redirect_uri: &str,
        client_id: Option<&str>,
    ) -> Result<()> {
        self.prepare(code_host_id, redirect_uri, client_id)
            .await
            .map(|_| ())
    }

    async fn prepare(
        &self,
        code_host_id: i64,
        redirect_uri: &str,
        client_id: Option<&str>,
    ) -> Result<(CodeHost, Arc<dyn ProviderAdapter>)> {
        validate_redirect_uri(redirect_uri)?;

        let host = self
            .with_store_timeout("get", self.store.get(code_host_id))
            .await?;
        let adapter = self.adapter_for(&host)?;

        if client_id.unwrap_or(&host.client_id).trim().is_empty() {
            return Err(AuthError::InvalidRequest {
                reason: format!("code host {code_host_id} has no client_id configured"),
            });
        }
        Ok((host, adapter))
    }

    /// Finish a handshake from the provider's callback parameters.
    ///
    /// The state token is consumed as soon as it verifies, so a token can
    /// drive at most one attempt whatever its outcome. On success exactly
    /// one token-field update is written; on failure none.
    ///
    /// # Errors
    ///
    /// Every failure is returned as a [`HandshakeFailure`] whose
    /// `redirect_uri` is still usable for the browser: the one bound into
    /// the token when its tag verifies (even if it expired or was already
    /// used), otherwise the configured default.
    pub async fn complete(
        &self,
        params: &CallbackParams,
    ) -> std::result::Result<CompletedHandshake, HandshakeFailure> {
        let verified = match self.verify_state(params.state.as_deref()).await {
            Ok(verified) => verified,
            Err(error) => {
                let authentic = params
                    .state
                    .as_deref()
                    .and_then(|token| self.codec.authentic_claims(token));
                return Err(match authentic {
                    Some(claims) => HandshakeFailure {
                        error,
                        redirect_uri: claims.redirect_uri,
                        code_host_id: Some(claims.code_host_id),
                    },
                    None => HandshakeFailure {
                        error,
                        redirect_uri: self.config.default_redirect.clone(),
                        code_host_id: None,
                    },
                });
            }
        };

        let StateClaims {
            code_host_id,
            redirect_uri,
            ..
        } = verified.claims;

        match self.finish(code_host_id, params).await {
            Ok(()) => {
                info!(code_host_id, "authorization completed");
                Ok(CompletedHandshake {
                    code_host_id,
                    redirect_uri,
                })
            }
            Err(error) => Err(HandshakeFailure {
                error,
                redirect_uri,
                code_host_id: Some(code_host_id),
            }),
        }
    }

    // -- phases -------------------------------------------------------------

    /// Decode, verify and consume the state token.
    async fn verify_state(&self, state: Option<&str>) -> Result<VerifiedState> {
        let token = state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidState {
                reason: "callback has no state parameter".into(),
            })?;

        let verified = self.codec.decode(token)?;
        debug!(code_host_id = verified.claims.code_host_id, "state token verified");

        let first = self
            .with_store_timeout(
                "consume state",
                self.replay.consume(&verified.fingerprint, verified.expires_at),
            )
            .await?;
        if !first {
            warn!(
                code_host_id = verified.claims.code_host_id,
                "state token replayed"
            );
            return Err(AuthError::ReplayedState);
        }

        Ok(verified)
    }

    /// Everything after the token is consumed.
    async fn finish(&self, code_host_id: i64, params: &CallbackParams) -> Result<()> {
        let host = self
            .with_store_timeout("get", self.store.get(code_host_id))
            .await?;

        if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            let reason = match params.error_description.as_deref() {
                Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
                _ => error.to_string(),
            };
            warn!(code_host_id, %reason, "provider reported authorization denial");
            return Err(AuthError::AuthorizationDenied { reason });
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::InvalidRequest {
                reason: "callback carries neither code nor error".into(),
            })?;

        let adapter = self.adapter_for(&host)?;

        let request = ExchangeRequest {
            base_address: host.address.clone(),
            client_id: host.client_id.clone(),
            client_secret: host.client_secret.clone(),
            code: code.to_string(),
            callback_uri: self.config.callback_url.clone(),
        };
        let grant = self.exchange_with_retry(adapter.as_ref(), &request).await?;

        self.with_store_timeout("update tokens", self.store.update_tokens(code_host_id, &grant))
            .await
    }

    /// Code exchange with a per-attempt timeout and linear backoff. Only
    /// network failures are retried.
    async fn exchange_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &ExchangeRequest,
    ) -> Result<TokenGrant> {
        let timeout = self.config.exchange_timeout();
        let retries = self.config.exchange_retries;
        let mut attempt: u32 = 0;

        loop {
            let outcome = match tokio::time::timeout(timeout, adapter.exchange_code(request)).await {
                Ok(result) => result,
                Err(_) => Err(AuthError::NetworkFailure {
                    reason: format!("code exchange timed out after {}s", timeout.as_secs()),
                }),
            };

            match outcome {
                Err(err) if err.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "code exchange failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                }
                other => return other,
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    fn adapter_for(&self, host: &CodeHost) -> Result<Arc<dyn ProviderAdapter>> {
        self.providers
            .get(host.kind)
            .ok_or(AuthError::UnsupportedProvider { kind: host.kind })
    }

    async fn with_store_timeout<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.config.store_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AuthError::StoreUnavailable {
                reason: format!("{operation} timed out after {}s", limit.as_secs()),
            })?
    }
}

fn validate_redirect_uri(redirect_uri: &str) -> Result<()> {
    let url = Url::parse(redirect_uri).map_err(|e| AuthError::InvalidRequest {
        reason: format!("redirect_uri is not an absolute URI: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AuthError::InvalidRequest {
            reason: format!("redirect_uri must be an http(s) URL: {redirect_uri}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use codehost_store::ProviderKind;

    use super::*;
    use crate::replay::MemoryReplayGuard;
    use crate::state::SigningKeys;

    // -- fakes --------------------------------------------------------------

    #[derive(Default)]
    struct FakeStore {
        hosts: Mutex<HashMap<i64, CodeHost>>,
        token_writes: AtomicUsize,
    }

    impl FakeStore {
        fn with_host(host: CodeHost) -> Arc<Self> {
            let store = Self::default();
            store.hosts.lock().unwrap().insert(host.id, host);
            Arc::new(store)
        }

        fn remove(&self, id: i64) {
            self.hosts.lock().unwrap().remove(&id);
        }

        fn access_token(&self, id: i64) -> Option<String> {
            self.hosts
                .lock()
                .unwrap()
                .get(&id)
                .and_then(|h| h.access_token.clone())
        }

        fn writes(&self) -> usize {
            self.token_writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialStore for FakeStore {
        async fn get(&self, id: i64) -> Result<CodeHost> {
            self.hosts
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(AuthError::NotFound { id })
        }

        async fn update_tokens(&self, id: i64, grant: &TokenGrant) -> Result<()> {
            let mut hosts = self.hosts.lock().unwrap();
            let host = hosts.get_mut(&id).ok_or(AuthError::NotFound { id })?;
            host.access_token = Some(grant.access_token.clone());
            host.refresh_token = grant.refresh_token.clone();
            host.token_expiry = grant.expires_at;
            self.token_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Adapter that answers from a script: `failures` network errors first,
    /// then `tok1` for code `xyz` and a rejection for anything else.
    struct FakeAdapter {
        kind: ProviderKind,
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(kind: ProviderKind, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                kind,
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn authorization_url(
            &self,
            base_address: &str,
            client_id: &str,
            state: &str,
            callback_uri: &str,
        ) -> Result<Url> {
            let mut url = Url::parse(&format!("{base_address}/oauth/authorize")).unwrap();
            url.query_pairs_mut()
                .append_pair("client_id", client_id)
                .append_pair("state", state)
                .append_pair("redirect_uri", callback_uri);
            Ok(url)
        }

        async fn exchange_code(&self, request: &ExchangeRequest) -> Result<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AuthError::NetworkFailure {
                    reason: "connection reset".into(),
                });
            }
            if request.code != "xyz" {
                return Err(AuthError::ProviderRejected {
                    reason: "bad_verification_code".into(),
                });
            }
            Ok(TokenGrant {
                access_token: "tok1".into(),
                refresh_token: None,
                expires_at: None,
            })
        }
    }

    fn host(id: i64, kind: ProviderKind) -> CodeHost {
        CodeHost {
            id,
            kind,
            address: "https://git.example.com".into(),
            owner: "team".into(),
            alias: None,
            client_id: "abc".into(),
            client_secret: Some("shh".into()),
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            callback_url: "https://ci.example.com/api/codehosts/callback".into(),
            default_redirect: "https://ci.example.com/".into(),
            retry_backoff_ms: 1,
            ..AuthConfig::default()
        }
    }

    fn orchestrator(
        store: Arc<FakeStore>,
        adapter: Arc<FakeAdapter>,
    ) -> AuthorizationOrchestrator {
        let config = config();
        let mut providers = ProviderRegistry::new();
        providers.register(adapter);
        let codec = StateTokenCodec::new(
            SigningKeys::new(vec![vec![3u8; 32]]).unwrap(),
            config.state_ttl(),
            config.clock_skew(),
        );
        let replay = Arc::new(MemoryReplayGuard::new(config.state_ttl() + config.clock_skew()));
        AuthorizationOrchestrator::new(store, providers, codec, replay, config)
    }

    fn state_of(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn callback(state: &str, code: &str) -> CallbackParams {
        CallbackParams {
            state: Some(state.into()),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    // -- initiate -----------------------------------------------------------

    #[tokio::test]
    async fn end_to_end_handshake() {
        let store = FakeStore::with_host(host(42, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));

        let url = orch.initiate(42, "https://app/ui").await.unwrap();
        assert!(url.as_str().starts_with("https://git.example.com/oauth/authorize?"));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "abc");
        assert_eq!(
            params["redirect_uri"],
            "https://ci.example.com/api/codehosts/callback"
        );
        assert_eq!(store.writes(), 0);

        let done = orch.complete(&callback(&state_of(&url), "xyz")).await.unwrap();
        assert_eq!(done.redirect_uri, "https://app/ui");
        assert_eq!(done.code_host_id, 42);
        assert_eq!(store.access_token(42).as_deref(), Some("tok1"));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn initiate_rejects_relative_redirect() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));
        for bad in ["/ui", "not a uri", "javascript:alert(1)"] {
            let err = orch.initiate(1, bad).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidRequest { .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn initiate_unknown_host_is_not_found() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));
        let err = orch.initiate(2, "https://app/ui").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { id: 2 }));
    }

    #[tokio::test]
    async fn initiate_without_adapter_is_unsupported() {
        let store = FakeStore::with_host(host(1, ProviderKind::Gerrit));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));
        let err = orch.initiate(1, "https://app/ui").await.unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn preflight_checks_without_issuing() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));

        orch.preflight(1, "https://app/ui", None).await.unwrap();
        orch.preflight(1, "https://app/ui", Some("new-client")).await.unwrap();
        assert!(matches!(
            orch.preflight(1, "/relative", Some("new-client")).await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert!(matches!(
            orch.preflight(1, "https://app/ui", Some("  ")).await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert!(matches!(
            orch.preflight(9, "https://app/ui", None).await,
            Err(AuthError::NotFound { id: 9 })
        ));
    }

    #[tokio::test]
    async fn preflight_accepts_incoming_client_id() {
        let mut bare = host(1, ProviderKind::GitLab);
        bare.client_id = String::new();
        let orch = orchestrator(
            FakeStore::with_host(bare),
            FakeAdapter::new(ProviderKind::GitLab, 0),
        );

        assert!(matches!(
            orch.preflight(1, "https://app/ui", None).await,
            Err(AuthError::InvalidRequest { .. })
        ));
        orch.preflight(1, "https://app/ui", Some("abc")).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_initiates_issue_distinct_tokens() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));
        let (a, b) = tokio::join!(
            orch.initiate(1, "https://app/ui"),
            orch.initiate(1, "https://app/ui")
        );
        assert_ne!(state_of(&a.unwrap()), state_of(&b.unwrap()));
    }

    // -- complete -----------------------------------------------------------

    #[tokio::test]
    async fn second_completion_is_replayed() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        orch.complete(&callback(&state, "xyz")).await.unwrap();
        let failure = orch.complete(&callback(&state, "xyz")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::ReplayedState));
        assert_eq!(failure.redirect_uri, "https://app/ui");
        assert_eq!(failure.code_host_id, Some(1));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn expired_token_redirects_to_its_origin() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let adapter = FakeAdapter::new(ProviderKind::GitLab, 0);
        let orch = orchestrator(store.clone(), adapter.clone());
        let issued = chrono::Utc::now().timestamp() - 3_600;
        let state = orch
            .codec
            .encode(&StateClaims::issued_at(1, "https://app/ui", issued))
            .unwrap();

        let failure = orch.complete(&callback(&state, "xyz")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::ExpiredState { .. }));
        assert_eq!(failure.redirect_uri, "https://app/ui");
        assert_eq!(failure.code_host_id, Some(1));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn concurrent_completions_write_once() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        let params = callback(&state, "xyz");
        let (a, b) = tokio::join!(orch.complete(&params), orch.complete(&params));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn denial_keeps_store_untouched_and_redirects_back() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        let failure = orch
            .complete(&CallbackParams {
                state: Some(state),
                error: Some("access_denied".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AuthError::AuthorizationDenied { .. }));
        assert_eq!(failure.redirect_uri, "https://app/ui");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn deleted_host_is_not_found_without_write() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let adapter = FakeAdapter::new(ProviderKind::GitLab, 0);
        let orch = orchestrator(store.clone(), adapter.clone());
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        store.remove(1);
        let failure = orch.complete(&callback(&state, "xyz")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::NotFound { id: 1 }));
        assert_eq!(failure.redirect_uri, "https://app/ui");
        assert_eq!(store.writes(), 0);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn denial_for_deleted_host_is_not_found() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        store.remove(1);
        let failure = orch
            .complete(&CallbackParams {
                state: Some(state),
                error: Some("access_denied".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AuthError::NotFound { id: 1 }));
        assert_eq!(failure.redirect_uri, "https://app/ui");
    }

    #[tokio::test]
    async fn bad_state_falls_back_to_default_redirect() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store.clone(), FakeAdapter::new(ProviderKind::GitLab, 0));

        let failure = orch.complete(&callback("garbage", "xyz")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::InvalidState { .. }));
        assert_eq!(failure.redirect_uri, "https://ci.example.com/");
        assert_eq!(failure.code_host_id, None);

        let missing = orch.complete(&CallbackParams::default()).await.unwrap_err();
        assert!(matches!(missing.error, AuthError::InvalidState { .. }));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn network_failures_are_retried() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let adapter = FakeAdapter::new(ProviderKind::GitLab, 2);
        let orch = orchestrator(store.clone(), adapter.clone());
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        orch.complete(&callback(&state, "xyz")).await.unwrap();
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let adapter = FakeAdapter::new(ProviderKind::GitLab, 10);
        let orch = orchestrator(store.clone(), adapter.clone());
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        let failure = orch.complete(&callback(&state, "xyz")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::NetworkFailure { .. }));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn provider_rejection_is_not_retried() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let adapter = FakeAdapter::new(ProviderKind::GitLab, 0);
        let orch = orchestrator(store.clone(), adapter.clone());
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        let failure = orch.complete(&callback(&state, "wrong")).await.unwrap_err();
        assert!(matches!(failure.error, AuthError::ProviderRejected { .. }));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn callback_without_code_or_error_is_invalid_request() {
        let store = FakeStore::with_host(host(1, ProviderKind::GitLab));
        let orch = orchestrator(store, FakeAdapter::new(ProviderKind::GitLab, 0));
        let state = state_of(&orch.initiate(1, "https://app/ui").await.unwrap());

        let failure = orch
            .complete(&CallbackParams {
                state: Some(state),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AuthError::InvalidRequest { .. }));
    }
}
