//! Handshake routes: initiate and provider callback.
//!
//! Initiate answers with an error body on failure; it never redirects
//! anywhere but to the provider. The callback always redirects: back to the
//! caller's redirect URI with `success=true`, or with `success=false&err=`
//! when the handshake failed.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use url::Url;

use codehost_auth::CallbackParams;
use codehost_store::CodeHostUpdate;

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

/// Body of `POST /api/codehosts/{id}/auth`.
#[derive(Debug, Deserialize)]
pub struct InitiateBody {
    pub redirect_uri: String,
    /// Replaces the stored client id before redirecting, when set.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Replaces the stored client secret before redirecting, when set.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Append query pairs to a redirect target.
fn decorate(target: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse(target) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(pairs.iter().copied());
            url.to_string()
        }
        Err(_) => {
            let query = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            let sep = if target.contains('?') { '&' } else { '?' };
            format!("{target}{sep}{query}")
        }
    }
}

/// `POST /api/codehosts/{id}/auth`
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<InitiateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let client_id = body.client_id.filter(|c| !c.trim().is_empty());
    let client_secret = body.client_secret.filter(|s| !s.is_empty());

    // Nothing is written unless the handshake could start.
    state
        .auth
        .preflight(id, &body.redirect_uri, client_id.as_deref())
        .await?;

    if client_id.is_some() || client_secret.is_some() {
        state
            .hosts
            .update(
                id,
                CodeHostUpdate {
                    client_id,
                    client_secret,
                    ..Default::default()
                },
            )
            .await?;
    }

    let url = state.auth.initiate(id, &body.redirect_uri).await?;
    Ok(found(url.as_str()))
}

/// `GET /api/codehosts/callback`
pub async fn callback(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::error!(
                code = "invalid_request",
                error = %rejection.body_text(),
                "authorization callback has a malformed query"
            );
            return found(&decorate(
                &state.auth.config().default_redirect,
                &[("success", "false"), ("err", "invalid_request")],
            ));
        }
    };

    match state.auth.complete(&params).await {
        Ok(done) => found(&decorate(&done.redirect_uri, &[("success", "true")])),
        Err(failure) => {
            let code = failure.error.code();
            tracing::error!(
                code,
                code_host_id = failure.code_host_id,
                error = %failure.error,
                "authorization callback failed"
            );
            found(&decorate(
                &failure.redirect_uri,
                &[("success", "false"), ("err", code)],
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorate_appends_to_existing_query() {
        assert_eq!(
            decorate("https://app/ui?tab=git", &[("success", "true")]),
            "https://app/ui?tab=git&success=true"
        );
        assert_eq!(
            decorate("https://app/ui", &[("success", "false"), ("err", "expired_state")]),
            "https://app/ui?success=false&err=expired_state"
        );
    }

    #[test]
    fn decorate_handles_unparseable_targets() {
        assert_eq!(decorate("/ui", &[("success", "true")]), "/ui?success=true");
    }

    #[test]
    fn found_sets_location() {
        let response = found("https://provider/authorize");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://provider/authorize"
        );
    }
}
