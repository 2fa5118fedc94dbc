//! REST API route handlers for code host records.
//!
//! Read responses never carry token material and mask the client secret.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use codehost_store::{CodeHost, CodeHostFilter, CodeHostUpdate, NewCodeHost, ProviderKind};

use crate::error::{ApiError, parse_id};
use crate::state::AppState;

/// Placeholder shown instead of a stored client secret.
pub const SECRET_MASK: &str = "******";

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

/// Public view of a code host.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeHostView {
    pub id: i64,
    pub kind: ProviderKind,
    pub address: String,
    pub owner: String,
    pub alias: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub is_ready: bool,
    pub token_expiry: Option<DateTime<Utc>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<CodeHost> for CodeHostView {
    fn from(host: CodeHost) -> Self {
        let is_ready = host.is_ready();
        Self {
            id: host.id,
            kind: host.kind,
            address: host.address,
            owner: host.owner,
            alias: host.alias,
            client_id: host.client_id,
            client_secret: host
                .client_secret
                .filter(|s| !s.is_empty())
                .map(|_| SECRET_MASK.to_string()),
            is_ready,
            token_expiry: host.token_expiry,
            created_at: host.created_at,
            updated_at: host.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
}

/// Liveness plus a database round trip.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            false
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            database,
        }),
    )
}

// ---------------------------------------------------------------------------
// Code host CRUD
// ---------------------------------------------------------------------------

/// Query string of the list route. `source` is the provider kind.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub address: Option<String>,
    pub owner: Option<String>,
    pub source: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<CodeHostFilter, ApiError> {
        let kind = match self.source.as_deref().filter(|s| !s.is_empty()) {
            Some(source) => Some(
                ProviderKind::parse(source)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown source: {source}")))?,
            ),
            None => None,
        };
        Ok(CodeHostFilter {
            address: self.address,
            owner: self.owner,
            kind,
        })
    }
}

/// `GET /api/codehosts`
pub async fn list_codehosts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CodeHostView>>, ApiError> {
    let hosts = state.hosts.list(query.into_filter()?).await?;
    Ok(Json(hosts.into_iter().map(CodeHostView::from).collect()))
}

/// `POST /api/codehosts`
pub async fn create_codehost(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewCodeHost>, JsonRejection>,
) -> Result<(StatusCode, Json<CodeHostView>), ApiError> {
    let Json(new) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let host = state.hosts.create(new).await?;
    Ok((StatusCode::CREATED, Json(host.into())))
}

/// `GET /api/codehosts/{id}`
pub async fn get_codehost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CodeHostView>, ApiError> {
    let host = state.hosts.get(parse_id(&id)?).await?;
    Ok(Json(host.into()))
}

/// `PUT /api/codehosts/{id}`
pub async fn update_codehost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<CodeHostUpdate>, JsonRejection>,
) -> Result<Json<CodeHostView>, ApiError> {
    let id = parse_id(&id)?;
    let Json(update) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let host = state.hosts.update(id, update).await?;
    Ok(Json(host.into()))
}

/// `DELETE /api/codehosts/{id}`
pub async fn delete_codehost(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.hosts.delete(parse_id(&id)?).await?;
    Ok((StatusCode::OK, Json(json!({"deleted": true}))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> CodeHost {
        CodeHost {
            id: 1,
            kind: ProviderKind::GitHub,
            address: "https://github.com".into(),
            owner: "acme".into(),
            alias: None,
            client_id: "cid".into(),
            client_secret: Some("plain-secret".into()),
            access_token: Some("gho_token".into()),
            refresh_token: Some("ghr_token".into()),
            token_expiry: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn view_masks_secret_and_drops_tokens() {
        let view = CodeHostView::from(host());
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains(SECRET_MASK));
        assert!(!json.contains("plain-secret"));
        assert!(!json.contains("gho_token"));
        assert!(!json.contains("ghr_token"));
        assert!(view.is_ready);
    }

    #[test]
    fn view_without_secret_has_null() {
        let mut h = host();
        h.client_secret = None;
        h.access_token = None;
        let view = CodeHostView::from(h);
        assert!(view.client_secret.is_none());
        assert!(!view.is_ready);
    }

    #[test]
    fn list_query_parses_source() {
        let filter = ListQuery {
            source: Some("gitlab".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.kind, Some(ProviderKind::GitLab));

        let bad = ListQuery {
            source: Some("svn".into()),
            ..Default::default()
        }
        .into_filter();
        assert!(bad.is_err());
    }
}
