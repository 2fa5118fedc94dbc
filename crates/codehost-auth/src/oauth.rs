//! OAuth 2.0 authorization code adapter for the built-in providers.
//!
//! GitHub, GitLab and Gitee all speak the same RFC 6749 authorization code
//! grant; they differ in endpoint paths, requested scopes, and how they
//! report failures. [`OAuthProvider`] is parameterised by
//! [`ProviderKind`] to cover all three.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use codehost_store::{ProviderKind, TokenGrant};
use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, Result};
use crate::provider::{ExchangeRequest, ProviderAdapter};

/// Longest slice of an unparseable error body quoted in an error message.
const MAX_BODY_EXCERPT: usize = 200;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Per-provider endpoint layout, relative to the code host address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize_path: &'static str,
    pub token_path: &'static str,
    pub scope: &'static str,
}

impl Endpoints {
    /// Layout for `kind`, or `None` for kinds without OAuth support.
    pub fn for_kind(kind: ProviderKind) -> Option<Self> {
        match kind {
            ProviderKind::GitHub => Some(Self {
                authorize_path: "/login/oauth/authorize",
                token_path: "/login/oauth/access_token",
                scope: "repo,user",
            }),
            ProviderKind::GitLab => Some(Self {
                authorize_path: "/oauth/authorize",
                token_path: "/oauth/token",
                scope: "api read_user",
            }),
            ProviderKind::Gitee => Some(Self {
                authorize_path: "/oauth/authorize",
                token_path: "/oauth/token",
                scope: "projects user_info",
            }),
            ProviderKind::Gerrit => None,
        }
    }
}

/// Append `path` to the path of `base`, keeping its query string.
fn endpoint_url(base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| AuthError::InvalidRequest {
        reason: format!("code host address {base:?} is not a valid URL: {e}"),
    })?;
    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Token response
// ---------------------------------------------------------------------------

/// Token endpoint JSON, success and failure shapes combined.
///
/// GitHub answers `200 OK` with an `error` field for a bad code, so the
/// error fields are checked on every response, not only non-2xx ones.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn rejection_reason(&self) -> Option<String> {
        self.error.as_ref().map(|error| match &self.error_description {
            Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
            _ => error.clone(),
        })
    }

    /// Convert into a [`TokenGrant`], computing the absolute expiry from
    /// `expires_in`.
    fn into_grant(self) -> Result<TokenGrant> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::ProviderRejected {
                reason: "token response has no access_token".into(),
            })?;

        let expires_at = self
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}

// ---------------------------------------------------------------------------
// OAuthProvider
// ---------------------------------------------------------------------------

/// Authorization code adapter for one provider kind.
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    kind: ProviderKind,
    endpoints: Endpoints,
    client: reqwest::Client,
}

impl OAuthProvider {
    /// Create an adapter for `kind` whose token requests time out after
    /// `exchange_timeout`.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnsupportedProvider`] for kinds without OAuth support.
    pub fn new(kind: ProviderKind, exchange_timeout: Duration) -> Result<Self> {
        let endpoints = Endpoints::for_kind(kind).ok_or(AuthError::UnsupportedProvider { kind })?;
        let client = reqwest::Client::builder()
            .timeout(exchange_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            kind,
            endpoints,
            client,
        })
    }

    /// Parse the HTTP response from the token endpoint.
    async fn parse_token_response(response: reqwest::Response) -> Result<TokenGrant> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) => {
                if let Some(reason) = parsed.rejection_reason() {
                    return Err(AuthError::ProviderRejected { reason });
                }
                if !status.is_success() {
                    return Err(AuthError::ProviderRejected {
                        reason: format!("HTTP {status}"),
                    });
                }
                parsed.into_grant()
            }
            Err(_) => {
                let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
                Err(AuthError::ProviderRejected {
                    reason: format!("HTTP {status}: unexpected token response: {excerpt}"),
                })
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for OAuthProvider {
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
        let mut url = endpoint_url(base_address, self.endpoints.authorize_path)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", callback_uri)
            .append_pair("state", state)
            .append_pair("scope", self.endpoints.scope);
        Ok(url)
    }

    async fn exchange_code(&self, request: &ExchangeRequest) -> Result<TokenGrant> {
        let token_url = endpoint_url(&request.base_address, self.endpoints.token_path)?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("client_id", request.client_id.as_str()),
            ("redirect_uri", request.callback_uri.as_str()),
        ];
        if let Some(secret) = request.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(kind = %self.kind, token_url = %token_url, "exchanging authorization code");

        let response = self
            .client
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
