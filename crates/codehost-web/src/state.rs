//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers. It holds the database handle (for health checks), the code host
//! store behind the CRUD routes, and the orchestrator behind the handshake
//! routes.

use codehost_auth::AuthorizationOrchestrator;
use codehost_store::{CodeHostStore, Database};

use crate::WebConfig;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Web server configuration.
    pub config: WebConfig,

    /// Database handle for health checks.
    pub db: Database,

    /// Code host records.
    pub hosts: CodeHostStore,

    /// Drives the authorization handshake.
    pub auth: AuthorizationOrchestrator,
}
