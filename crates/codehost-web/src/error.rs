//! API error type and its HTTP mapping.
//!
//! Every failing handler returns [`ApiError`], rendered as
//!
//! ```json
//! {"error": {"code": "not_found", "message": "code host not found: 7"}}
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use codehost_auth::AuthError;
use codehost_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed path, query or body.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) if err.is_state_error() => StatusCode::BAD_REQUEST,
            Self::Auth(err) => match err {
                AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
                AuthError::UnsupportedProvider { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                AuthError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
                AuthError::ProviderRejected { .. } | AuthError::NetworkFailure { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                AuthError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Store(store) => store_status(store),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(err) => store_status(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::Store(store)) | Self::Store(store) => store_code(store),
            Self::Auth(err) => err.code(),
            Self::BadRequest(_) => "invalid_request",
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::NotFound { .. } => "not_found",
        StoreError::InvalidArgument(_) => "invalid_request",
        _ => "store_error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": self.code(),
                    "message": message,
                }
            })),
        )
            .into_response()
    }
}

/// Parse a numeric path id.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid code host id: {raw:?}")))
}
