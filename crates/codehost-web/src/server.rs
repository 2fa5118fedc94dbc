//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and serves
//! until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::WebConfig;
use crate::api;
use crate::oauth;
use crate::state::AppState;

/// Build the router with all routes registered.
///
/// The literal `callback` segment is registered alongside `{id}`; axum
/// prefers static segments, so the callback is never parsed as an id.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health))
        // Code host CRUD.
        .route(
            "/api/codehosts",
            get(api::list_codehosts).post(api::create_codehost),
        )
        .route(
            "/api/codehosts/{id}",
            get(api::get_codehost)
                .put(api::update_codehost)
                .delete(api::delete_codehost),
        )
        // Authorization handshake.
        .route("/api/codehosts/callback", get(oauth::callback))
        .route("/api/codehosts/{id}/auth", post(oauth::initiate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// The code host API server.
pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.clone(),
            state,
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Bind and serve until `shutdown` resolves; in-flight requests finish
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "web server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("web server stopped");
        Ok(())
    }
}
